pub mod backup;
pub mod logging;
pub mod notification;
pub mod restore;
pub mod scheduler;
