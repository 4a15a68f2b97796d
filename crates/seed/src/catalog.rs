//! Category and product generators.

use anyhow::{Context, Result, bail};
use common::PageRequest;
use domain::{
    CatalogService, Category, CategoryDraft, DomainError, Product, ProductDraft, ProductQuery, Store,
};
use rand::Rng;
use rand::seq::SliceRandom;

/// A category with its children, used for the realistic tree.
struct Branch {
    name: &'static str,
    description: &'static str,
    children: &'static [Branch],
}

const fn leaf(name: &'static str) -> Branch {
    Branch {
        name,
        description: "",
        children: &[],
    }
}

const REALISTIC_TREE: &[Branch] = &[
    Branch {
        name: "Electronics",
        description: "Electronic devices and gadgets",
        children: &[
            Branch {
                name: "Mobile Phones",
                description: "Smartphones and feature phones",
                children: &[leaf("Smartphones"), leaf("Feature Phones"), leaf("Phone Accessories")],
            },
            Branch {
                name: "Laptops",
                description: "Notebook computers",
                children: &[leaf("Gaming Laptops"), leaf("Business Laptops"), leaf("Ultrabooks")],
            },
            Branch {
                name: "Audio",
                description: "Audio devices",
                children: &[leaf("Headphones"), leaf("Speakers"), leaf("Earbuds")],
            },
        ],
    },
    Branch {
        name: "Clothing",
        description: "Fashion and apparel",
        children: &[
            Branch {
                name: "Men's Clothing",
                description: "Clothing for men",
                children: &[leaf("Shirts"), leaf("Pants"), leaf("Jackets")],
            },
            Branch {
                name: "Women's Clothing",
                description: "Clothing for women",
                children: &[leaf("Dresses"), leaf("Tops"), leaf("Skirts")],
            },
        ],
    },
    Branch {
        name: "Home & Kitchen",
        description: "Home essentials and kitchen items",
        children: &[
            Branch {
                name: "Furniture",
                description: "Home furniture",
                children: &[leaf("Sofas"), leaf("Tables"), leaf("Chairs")],
            },
            Branch {
                name: "Kitchen Appliances",
                description: "Kitchen appliances",
                children: &[leaf("Blenders"), leaf("Microwaves"), leaf("Coffee Makers")],
            },
        ],
    },
    Branch {
        name: "Books",
        description: "Books and reading materials",
        children: &[leaf("Fiction"), leaf("Non-Fiction"), leaf("Children's Books")],
    },
    Branch {
        name: "Sports",
        description: "Sports and outdoor equipment",
        children: &[leaf("Fitness"), leaf("Camping"), leaf("Cycling")],
    },
];

/// Fallback roots created when products are seeded into an empty catalog.
const BASIC_CATEGORIES: &[&str] = &["Electronics", "Clothing", "Books", "Sports", "Home & Kitchen"];

/// (category, name, description, base price in cents, discount percent)
type ProductTemplate = (&'static str, &'static str, &'static str, i64, i32);

const REALISTIC_PRODUCTS: &[ProductTemplate] = &[
    ("Smartphones", "iPhone 15 Pro Max", "Premium flagship smartphone", 119_999, 5),
    ("Smartphones", "Samsung Galaxy S24 Ultra", "Top Android phone with S Pen", 129_999, 8),
    ("Smartphones", "Google Pixel 8 Pro", "Pure Android experience", 99_999, 10),
    ("Phone Accessories", "USB-C Fast Charger", "65W wall charger", 3_999, 0),
    ("Gaming Laptops", "ASUS ROG Zephyrus G14", "Compact gaming laptop", 169_999, 12),
    ("Business Laptops", "Lenovo ThinkPad X1 Carbon", "Business laptop", 179_999, 7),
    ("Ultrabooks", "Dell XPS 13", "Premium Windows ultrabook", 129_999, 5),
    ("Headphones", "Sony WH-1000XM5", "Noise-cancelling headphones", 39_999, 15),
    ("Speakers", "JBL Charge 5", "Portable bluetooth speaker", 17_999, 10),
    ("Earbuds", "AirPods Pro", "Wireless earbuds", 24_999, 0),
    ("Shirts", "Oxford Button-Down Shirt", "Classic cotton shirt", 4_999, 20),
    ("Pants", "Slim Fit Chinos", "Stretch cotton chinos", 5_999, 0),
    ("Jackets", "Down Puffer Jacket", "Warm winter jacket", 14_999, 25),
    ("Dresses", "Linen Summer Dress", "Lightweight linen dress", 7_999, 10),
    ("Sofas", "Three-Seat Fabric Sofa", "Comfortable family sofa", 89_999, 15),
    ("Coffee Makers", "Drip Coffee Maker", "12-cup programmable brewer", 7_999, 5),
    ("Blenders", "High-Speed Blender", "1500W countertop blender", 12_999, 0),
    ("Fiction", "The Midnight Library", "Novel by Matt Haig", 1_699, 0),
    ("Non-Fiction", "Sapiens", "A brief history of humankind", 2_299, 10),
    ("Fitness", "Adjustable Dumbbells", "Pair of 5-52.5 lb dumbbells", 34_999, 10),
    ("Camping", "Two-Person Tent", "Waterproof backpacking tent", 19_999, 20),
];

const ADJECTIVES: &[&str] = &[
    "Premium", "Classic", "Compact", "Deluxe", "Eco", "Smart", "Ultra", "Vintage", "Wireless",
    "Portable",
];

const NOUNS: &[&str] = &[
    "Widget", "Gadget", "Lamp", "Backpack", "Bottle", "Speaker", "Chair", "Notebook", "Watch",
    "Kettle",
];

const DISCOUNTS: &[i32] = &[0, 0, 0, 5, 10, 15, 20, 25];

/// Attempts at finding an unused product code before giving up.
const CODE_ATTEMPTS: usize = 5;

/// Soft-deletes every visible category, including subtrees.
pub async fn clear_categories<S: Store>(catalog: &CatalogService<S>) -> Result<usize> {
    let roots: Vec<Category> = catalog
        .store()
        .list_categories()
        .await?
        .into_iter()
        .filter(|c| c.parent_id.is_none())
        .collect();
    for root in &roots {
        catalog.delete_category(root.id).await?;
    }
    Ok(roots.len())
}

/// Creates `count` random root categories with a few children each, or the
/// realistic tree when `realistic` is set. Returns the number created.
pub async fn seed_categories<S: Store, R: Rng>(
    catalog: &CatalogService<S>,
    rng: &mut R,
    count: usize,
    realistic: bool,
) -> Result<usize> {
    if realistic {
        let mut created = 0;
        for branch in REALISTIC_TREE {
            created += create_branch(catalog, branch, None).await?;
        }
        return Ok(created);
    }

    let mut created = 0;
    for n in 1..=count {
        let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Misc");
        let root = catalog
            .create_category(
                CategoryDraft::new(format!("{adjective} Category {n}"))
                    .with_description(format!("Randomly generated category {n}")),
            )
            .await?;
        created += 1;

        for c in 1..=rng.gen_range(0..=3) {
            catalog
                .create_category(
                    CategoryDraft::new(format!("{} {c}", root.name)).with_parent(root.id),
                )
                .await?;
            created += 1;
        }
    }
    Ok(created)
}

async fn create_branch<S: Store>(
    catalog: &CatalogService<S>,
    branch: &Branch,
    parent: Option<&Category>,
) -> Result<usize> {
    let mut draft = CategoryDraft::new(branch.name);
    if !branch.description.is_empty() {
        draft = draft.with_description(branch.description);
    }
    if let Some(parent) = parent {
        draft = draft.with_parent(parent.id);
    }
    let category = catalog
        .create_category(draft)
        .await
        .with_context(|| format!("creating category {}", branch.name))?;
    tracing::debug!(category = branch.name, "Seeded category");

    let mut created = 1;
    for child in branch.children {
        created += Box::pin(create_branch(catalog, child, Some(&category))).await?;
    }
    Ok(created)
}

/// Soft-deletes every visible product.
pub async fn clear_products<S: Store>(catalog: &CatalogService<S>) -> Result<usize> {
    let products = all_products(catalog.store()).await?;
    for product in &products {
        catalog.delete_product(product.id).await?;
    }
    Ok(products.len())
}

/// Creates `count` random products, or the realistic set when `realistic` is
/// set. Seeds basic categories first if the catalog has none.
pub async fn seed_products<S: Store, R: Rng>(
    catalog: &CatalogService<S>,
    rng: &mut R,
    count: usize,
    realistic: bool,
) -> Result<usize> {
    let mut categories = catalog.store().list_categories().await?;
    if categories.is_empty() {
        tracing::warn!("No categories found, creating basic categories first");
        for name in BASIC_CATEGORIES {
            let draft = CategoryDraft::new(*name).with_description(format!("{name} products"));
            categories.push(catalog.create_category(draft).await?);
        }
    }

    let mut created = 0;
    if realistic {
        for &(category_name, name, description, price, discount) in REALISTIC_PRODUCTS {
            let Some(category) = categories.iter().find(|c| c.name == category_name) else {
                tracing::warn!(category = category_name, product = name, "Category missing, skipping");
                continue;
            };
            let mut draft = ProductDraft::new(name, "", category.id, price)
                .with_discount(discount)
                .with_stock(rng.gen_range(10..=100));
            draft.description = description.to_string();
            create_with_unique_code(catalog, rng, draft).await?;
            created += 1;
        }
        return Ok(created);
    }

    for _ in 0..count {
        let Some(category) = categories.choose(rng) else {
            bail!("no categories available for products");
        };
        let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Plain");
        let noun = NOUNS.choose(rng).copied().unwrap_or("Item");
        let draft = ProductDraft::new(
            format!("{adjective} {noun}"),
            "",
            category.id,
            rng.gen_range(500..=50_000),
        )
        .with_discount(DISCOUNTS.choose(rng).copied().unwrap_or(0))
        .with_stock(rng.gen_range(0..=200));
        create_with_unique_code(catalog, rng, draft).await?;
        created += 1;
    }
    Ok(created)
}

async fn create_with_unique_code<S: Store, R: Rng>(
    catalog: &CatalogService<S>,
    rng: &mut R,
    mut draft: ProductDraft,
) -> Result<Product> {
    for _ in 0..CODE_ATTEMPTS {
        draft.code = format!("PRD-{}", rng.gen_range(10_000..100_000));
        match catalog.create_product(draft.clone()).await {
            Ok(details) => return Ok(details.product),
            Err(DomainError::DuplicateProductCode(code)) => {
                tracing::debug!(%code, "Product code taken, retrying");
            }
            Err(e) => return Err(e).with_context(|| format!("creating product {}", draft.name)),
        }
    }
    bail!("could not find a free product code for {}", draft.name)
}

/// Every visible product, walking the store page by page.
pub async fn all_products<S: Store>(store: &S) -> domain::Result<Vec<Product>> {
    let mut products = Vec::new();
    let mut offset = 0;
    loop {
        let query = ProductQuery::new().paged(PageRequest::new(common::MAX_LIMIT, offset));
        let page = store.list_products(&query).await?;
        let fetched = page.results.len() as u32;
        products.extend(page.results);
        offset += fetched;
        if fetched == 0 || u64::from(offset) >= page.count {
            return Ok(products);
        }
    }
}
