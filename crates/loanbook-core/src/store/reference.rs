use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LoanbookError;
use crate::lending::product::LoanProduct;
use crate::types::Rate;
use crate::LoanbookResult;

/// Borrower record as supplied by the collaborator layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Borrower {
    pub id: Uuid,
    pub full_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub credit_score: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Read-only product and borrower lookup.
pub trait ReferenceData: Send + Sync {
    fn product(&self, id: Uuid) -> LoanbookResult<LoanProduct>;

    fn borrower(&self, id: Uuid) -> LoanbookResult<Borrower>;
}

/// In-process reference data used for tests, scenarios and embedding.
pub struct InMemoryReferenceData {
    max_interest_rate: Rate,
    products: RwLock<HashMap<Uuid, LoanProduct>>,
    borrowers: RwLock<HashMap<Uuid, Borrower>>,
}

impl InMemoryReferenceData {
    pub fn new(max_interest_rate: Rate) -> Self {
        Self {
            max_interest_rate,
            products: RwLock::new(HashMap::new()),
            borrowers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a product after validating its configuration. Products are
    /// immutable once registered.
    pub fn register_product(&self, product: LoanProduct) -> LoanbookResult<()> {
        product.validate(self.max_interest_rate)?;
        let mut products = self.products.write().map_err(|_| lock_failure())?;
        if products.contains_key(&product.id) {
            return Err(LoanbookError::Conflict(format!(
                "Product {} is already registered",
                product.id
            )));
        }
        products.insert(product.id, product);
        Ok(())
    }

    pub fn register_borrower(&self, borrower: Borrower) -> LoanbookResult<()> {
        if borrower.full_name.trim().is_empty() {
            return Err(LoanbookError::validation(
                "full_name",
                "Borrower name cannot be empty",
            ));
        }
        self.borrowers
            .write()
            .map_err(|_| lock_failure())?
            .insert(borrower.id, borrower);
        Ok(())
    }
}

fn lock_failure() -> LoanbookError {
    LoanbookError::Concurrency {
        operation: "reference data".into(),
        attempts: 1,
        reason: "lock poisoned".into(),
    }
}

impl ReferenceData for InMemoryReferenceData {
    fn product(&self, id: Uuid) -> LoanbookResult<LoanProduct> {
        self.products
            .read()
            .map_err(|_| lock_failure())?
            .get(&id)
            .cloned()
            .ok_or_else(|| LoanbookError::not_found("Loan product", id))
    }

    fn borrower(&self, id: Uuid) -> LoanbookResult<Borrower> {
        self.borrowers
            .read()
            .map_err(|_| lock_failure())?
            .get(&id)
            .cloned()
            .ok_or_else(|| LoanbookError::not_found("Borrower", id))
    }
}
