//! Product storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("product '{0}' not found")]
    NotFound(String),

    #[error("product '{0}' already exists")]
    AlreadyExists(String),
}

/// Document store holding products by id.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Product, RepositoryError>;

    /// Inserts a new product; fails if the id is taken.
    async fn create(&self, product: Product) -> Result<(), RepositoryError>;

    /// Inserts or replaces a product.
    async fn update(&self, product: Product) -> Result<(), RepositoryError>;
}

/// A process-local [`ProductRepository`].
#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<String, Product>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn get(&self, id: &str) -> Result<Product, RepositoryError> {
        self.products
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn create(&self, product: Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(RepositoryError::AlreadyExists(product.id));
        }
        products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn update(&self, product: Product) -> Result<(), RepositoryError> {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
        Ok(())
    }
}
