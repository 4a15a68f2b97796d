//! Catalog service: category tree and product rules on top of a [`Store`].

use std::collections::HashMap;
use std::sync::Arc;

use common::{CategoryId, Page, PageRequest, ProductId};

use crate::error::{DomainError, Result};
use crate::store::{ProductQuery, Store};
use crate::validation::ValidationErrors;

use super::{
    Category, CategoryDraft, CategoryNode, CategoryPatch, CategoryTree, Product, ProductDraft,
    ProductPatch,
};

const MISSING_PK: &str = "Invalid pk - object does not exist.";

/// The parts of a category embedded in product responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

impl From<&Category> for CategorySummary {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            parent_id: category.parent_id,
        }
    }
}

/// A product with its category. The category is `None` once it has been
/// deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDetails {
    pub product: Product,
    pub category: Option<CategorySummary>,
}

/// Service for managing categories and products.
pub struct CatalogService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn tree(&self) -> Result<CategoryTree> {
        Ok(CategoryTree::new(self.store.list_categories().await?))
    }

    /// Lists root categories with their active subcategories nested.
    #[tracing::instrument(skip(self))]
    pub async fn list_categories(
        &self,
        active: Option<bool>,
        page: PageRequest,
    ) -> Result<Page<CategoryNode>> {
        let tree = self.tree().await?;
        let roots: Vec<CategoryNode> = tree
            .roots(active)
            .into_iter()
            .filter_map(|root| tree.node(root.id))
            .collect();
        Ok(page.slice(roots))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_category(&self, id: CategoryId) -> Result<CategoryNode> {
        self.tree()
            .await?
            .node(id)
            .ok_or_else(|| DomainError::not_found("Category", id))
    }

    #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_category(&self, draft: CategoryDraft) -> Result<Category> {
        draft.validate()?;
        if let Some(parent_id) = draft.parent_id
            && self.store.get_category(parent_id).await?.is_none()
        {
            return Err(ValidationErrors::single("parent_category", MISSING_PK).into());
        }
        let category = self.store.insert_category(Category::from_draft(draft)).await?;
        tracing::info!(category_id = %category.id, "Category created");
        Ok(category)
    }

    /// Replaces every editable field of a category.
    #[tracing::instrument(skip(self, draft))]
    pub async fn update_category(&self, id: CategoryId, draft: CategoryDraft) -> Result<Category> {
        let tree = self.tree().await?;
        let mut category = tree
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Category", id))?;

        draft.validate()?;
        if let Some(parent_id) = draft.parent_id {
            if tree.get(parent_id).is_none() {
                return Err(ValidationErrors::single("parent_category", MISSING_PK).into());
            }
            if tree.would_create_cycle(id, parent_id) {
                return Err(ValidationErrors::single(
                    "parent_category",
                    "Cannot create circular category reference.",
                )
                .into());
            }
        }

        category.apply(draft);
        self.store.update_category(category).await
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn patch_category(&self, id: CategoryId, patch: CategoryPatch) -> Result<Category> {
        let current = self
            .store
            .get_category(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Category", id))?;
        let mut draft = CategoryDraft::from(&current);
        patch.apply_to(&mut draft);
        self.update_category(id, draft).await
    }

    /// Soft-deletes a category and everything below it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        let tree = self.tree().await?;
        if tree.get(id).is_none() {
            return Err(DomainError::not_found("Category", id));
        }
        let mut ids = vec![id];
        ids.extend(tree.descendants(id));
        let deleted = self.store.soft_delete_categories(&ids).await?;
        tracing::info!(category_id = %id, deleted, "Category deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self, query: ProductQuery) -> Result<Page<ProductDetails>> {
        let page = self.store.list_products(&query).await?;
        let categories: HashMap<CategoryId, CategorySummary> = self
            .store
            .list_categories()
            .await?
            .iter()
            .map(|c| (c.id, CategorySummary::from(c)))
            .collect();
        Ok(page.map(|product| ProductDetails {
            category: categories.get(&product.category_id).cloned(),
            product,
        }))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<ProductDetails> {
        let product = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", id))?;
        self.details(product).await
    }

    #[tracing::instrument(skip(self, draft), fields(code = %draft.code))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<ProductDetails> {
        self.validate_product(&draft).await?;
        let product = self.store.insert_product(Product::from_draft(draft)).await?;
        tracing::info!(product_id = %product.id, "Product created");
        self.details(product).await
    }

    #[tracing::instrument(skip(self, draft))]
    pub async fn update_product(&self, id: ProductId, draft: ProductDraft) -> Result<ProductDetails> {
        let mut product = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", id))?;
        self.validate_product(&draft).await?;
        let write_stock = draft.stock_quantity.is_some();
        product.apply(draft);
        let product = self.store.update_product(product, write_stock).await?;
        self.details(product).await
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn patch_product(&self, id: ProductId, patch: ProductPatch) -> Result<ProductDetails> {
        let current = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", id))?;
        let mut draft = ProductDraft::from(&current);
        patch.apply_to(&mut draft);
        self.update_product(id, draft).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        if self.store.soft_delete_product(id).await? {
            tracing::info!(product_id = %id, "Product deleted");
            Ok(())
        } else {
            Err(DomainError::not_found("Product", id))
        }
    }

    async fn validate_product(&self, draft: &ProductDraft) -> Result<()> {
        let mut errors = match draft.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if self.store.get_category(draft.category_id).await?.is_none() {
            errors.add("category", MISSING_PK);
        }
        errors.into_result().map_err(DomainError::from)
    }

    async fn details(&self, product: Product) -> Result<ProductDetails> {
        let category = self
            .store
            .get_category(product.category_id)
            .await?
            .as_ref()
            .map(CategorySummary::from);
        Ok(ProductDetails { product, category })
    }
}
