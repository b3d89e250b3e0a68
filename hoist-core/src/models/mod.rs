pub mod event;
pub mod task;

pub use event::TaskEvent;
pub use task::{TaskId, TransferRequest, TransferStatus, TransferTask};
