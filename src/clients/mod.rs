pub mod anthropic_client;
pub mod llm_client;
