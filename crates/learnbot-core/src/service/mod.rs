pub mod commands;
pub mod dispatch;
pub mod gateway;
pub mod liveness;
pub mod messages;
pub mod reconcile;
