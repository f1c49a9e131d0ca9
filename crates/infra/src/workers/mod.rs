//! Background workers (projection feed, auto-block sweep).

pub mod block_sweeper;
pub mod projection_worker;

pub use block_sweeper::{BlockSweeper, BlockSweeperHandle};
pub use projection_worker::{ProjectionWorker, WorkerHandle};
