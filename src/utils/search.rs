use crate::models::Product;

/// Keeps the products whose `nombre` or `descripcion` contains `query`,
/// ignoring case. An empty query keeps everything.
pub fn filter_products(products: Vec<Product>, query: &str) -> Vec<Product> {
    let needle = query.to_lowercase();

    if needle.is_empty() {
        return products;
    }

    products
        .into_iter()
        .filter(|product| matches_query(product, &needle))
        .collect()
}

fn matches_query(product: &Product, needle: &str) -> bool {
    product.nombre.to_lowercase().contains(needle)
        || product.descripcion.to_lowercase().contains(needle)
}
