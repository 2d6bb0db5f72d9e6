//! Name to contract id bindings.

use super::StateError;
use txflow_storage::StorageService;
use txflow_types::{validation, ContractId};

const NAMESPACE: &str = "contracts";

pub struct ContractRegistry {
	storage: StorageService,
}

impl ContractRegistry {
	pub fn new(storage: StorageService) -> Self {
		Self { storage }
	}

	/// Binds `name` to `contract`, replacing an earlier binding.
	pub async fn register(&self, name: &str, contract: &ContractId) -> Result<(), StateError> {
		validation::validate_contract_name(name)?;
		contract.validate()?;

		self.storage.store(NAMESPACE, name, contract).await?;
		tracing::debug!(name = %name, contract = %contract, "Contract registered");
		Ok(())
	}

	pub async fn get(&self, name: &str) -> Result<Option<ContractId>, StateError> {
		Ok(self.storage.retrieve_optional(NAMESPACE, name).await?)
	}

	pub async fn unregister(&self, name: &str) -> Result<(), StateError> {
		self.storage.remove(NAMESPACE, name).await?;
		Ok(())
	}

	/// Every binding, sorted by name.
	pub async fn list(&self) -> Result<Vec<(String, ContractId)>, StateError> {
		let mut bindings = Vec::new();
		for name in self.storage.list_ids(NAMESPACE).await? {
			if let Some(contract) = self.get(&name).await? {
				bindings.push((name, contract));
			}
		}
		Ok(bindings)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use txflow_storage::implementations::memory::MemoryStorage;

	const ADDR: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";

	fn registry() -> ContractRegistry {
		ContractRegistry::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	#[tokio::test]
	async fn test_register_and_list() {
		let registry = registry();
		let vault = ContractId::new(ADDR, "token-vault");
		let oracle = ContractId::new(ADDR, "price-oracle");

		registry.register("vault", &vault).await.unwrap();
		registry.register("oracle", &oracle).await.unwrap();

		assert_eq!(registry.get("vault").await.unwrap(), Some(vault.clone()));
		assert_eq!(
			registry.list().await.unwrap(),
			vec![("oracle".to_string(), oracle), ("vault".to_string(), vault)]
		);

		registry.unregister("vault").await.unwrap();
		assert_eq!(registry.get("vault").await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_invalid_binding_rejected() {
		let registry = registry();
		let bad = ContractId::new("not-an-address", "token-vault");
		assert!(matches!(
			registry.register("vault", &bad).await,
			Err(StateError::Validation(_))
		));
		assert!(registry.list().await.unwrap().is_empty());
	}
}
