use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

const DEFAULT_REGION: &str = "eu-north-1";

#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn get_secret<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<T, lambda_http::Error>;
}

#[derive(Clone)]
pub struct AwsSecretsManagerSecretRepository(aws_sdk_secretsmanager::Client);

impl AwsSecretsManagerSecretRepository {
    pub async fn open() -> Self {
        let region = RegionProviderChain::default_provider().or_else(DEFAULT_REGION);
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Ok(url) = std::env::var("AWS_ENDPOINT_URL") {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        Self(aws_sdk_secretsmanager::Client::new(&config))
    }
}

#[async_trait]
impl SecretRepository for AwsSecretsManagerSecretRepository {
    async fn get_secret<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<T, lambda_http::Error> {
        let secret = self.0.get_secret_value().secret_id(name).send().await?;
        let Some(secret_value) = secret.secret_string() else {
            return Err(Box::new(SecretError::Missing(name)));
        };
        Ok(serde_json::from_str(secret_value)?)
    }
}

/// Secrets held in memory, for local runs and tests.
#[derive(Clone, Default)]
pub struct InMemorySecretRepository(HashMap<&'static str, String>);

impl InMemorySecretRepository {
    pub fn with_secret(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.0.insert(name, value.into());
        self
    }
}

#[async_trait]
impl SecretRepository for InMemorySecretRepository {
    async fn get_secret<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<T, lambda_http::Error> {
        let Some(value) = self.0.get(name) else {
            return Err(Box::new(SecretError::Missing(name)));
        };
        Ok(serde_json::from_str(value)?)
    }
}

#[derive(Debug)]
pub enum SecretError {
    Missing(&'static str),
}

impl std::fmt::Display for SecretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretError::Missing(name) => write!(f, "Missing secret {name}"),
        }
    }
}

impl std::error::Error for SecretError {}

#[cfg(test)]
mod tests {
    use super::{InMemorySecretRepository, SecretRepository};
    use crate::security::{NonceKey, NONCE_SECRET_NAME};
    use googletest::prelude::*;

    #[tokio::test]
    async fn returns_parsed_secret() -> Result<()> {
        let subject = InMemorySecretRepository::default()
            .with_secret(NONCE_SECRET_NAME, r#"{"NONCE_KEY": "arbitrary key"}"#);

        let secret: NonceKey = subject.get_secret(NONCE_SECRET_NAME).await.unwrap();

        verify_that!(secret.key, eq("arbitrary key"))
    }

    #[tokio::test]
    async fn fails_for_missing_secret() -> Result<()> {
        let subject = InMemorySecretRepository::default();

        let result = subject.get_secret::<NonceKey>(NONCE_SECRET_NAME).await;

        verify_that!(result.is_err(), eq(true))
    }

    #[tokio::test]
    async fn fails_for_malformed_secret() -> Result<()> {
        let subject =
            InMemorySecretRepository::default().with_secret(NONCE_SECRET_NAME, "not json");

        let result = subject.get_secret::<NonceKey>(NONCE_SECRET_NAME).await;

        verify_that!(result.is_err(), eq(true))
    }
}
