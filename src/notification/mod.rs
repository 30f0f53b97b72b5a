pub mod factory;
pub mod push;
pub mod service;

pub use factory::DomainEvent;
pub use service::NotificationService;
