pub mod descriptor_cache;
pub mod menu_service;
pub mod metadata;
pub mod proxy_service;
pub mod responder;
pub mod store;
