pub mod api;
pub mod clock;
pub mod logs;
pub mod storage;
pub mod visibility;
