pub mod disk_probe;
pub mod gpu_probe;
pub mod netlink;
pub mod process_actions;
pub mod process_probe;
pub mod system_probe;
