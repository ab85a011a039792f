pub mod exchange_client;
pub mod llm_client;
pub mod notifier;
