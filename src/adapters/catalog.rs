use crate::domain::model::{Item, ItemId};
use crate::utils::error::{AuctionError, Result};
use crate::utils::validation::validate_file_extensions;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// The items available to the auction, loaded once at start-up.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<Arc<Item>>,
}

impl Catalog {
    pub fn new(items: Vec<Item>) -> Result<Self> {
        let mut seen = HashSet::new();
        for item in &items {
            if item.id.0.trim().is_empty() {
                return Err(AuctionError::CatalogError {
                    item_id: item.id.clone(),
                    reason: "Item id cannot be empty".to_string(),
                });
            }
            if item.name.trim().is_empty() {
                return Err(AuctionError::CatalogError {
                    item_id: item.id.clone(),
                    reason: "Item name cannot be empty".to_string(),
                });
            }
            if let Some(rating) = item.rating.filter(|rating| !rating.is_finite()) {
                return Err(AuctionError::CatalogError {
                    item_id: item.id.clone(),
                    reason: format!("Rating must be a finite number, got {}", rating),
                });
            }
            if !seen.insert(item.id.clone()) {
                return Err(AuctionError::CatalogError {
                    item_id: item.id.clone(),
                    reason: "Duplicate item id".to_string(),
                });
            }
        }

        Ok(Self {
            items: items.into_iter().map(Arc::new).collect(),
        })
    }

    /// Reads a `.json` array or a `.csv` file with `id,name,cardRef,videoRef,rating`
    /// columns.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        validate_file_extensions("catalog", &[display], &["json", "csv"])?;

        let items: Vec<Item> = match path.extension().and_then(|ext| ext.to_str()) {
            Some("csv") => {
                let mut reader = csv::Reader::from_path(path)?;
                reader.deserialize().collect::<std::result::Result<_, _>>()?
            }
            _ => {
                let content = std::fs::read_to_string(path)?;
                Self::parse_json(&content)?
            }
        };

        tracing::info!("Loaded {} catalog items from {}", items.len(), path.display());
        Self::new(items)
    }

    pub fn parse_json(content: &str) -> Result<Vec<Item>> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn items(&self) -> &[Arc<Item>] {
        &self.items
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
