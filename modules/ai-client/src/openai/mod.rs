mod client;

pub use client::OpenAi;
