pub mod health;
pub mod verify;
pub mod webhooks;
