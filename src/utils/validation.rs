use std::str::FromStr;

use rust_decimal::Decimal;

use crate::{
    error::ValidationError,
    models::{ImagePayload, NewProduct, ProductFields, ProductUpdate},
};

/// Presence and numeric checks for the create flow. The image must be present
/// and non-empty.
pub fn validate_new_product(
    product: NewProduct,
) -> Result<(ProductFields, ImagePayload), ValidationError> {
    let image = match product.imagen {
        Some(image) if !image.is_empty() => image,
        _ => return Err(ValidationError::MissingFields),
    };

    let fields = validate_fields(&product.nombre, &product.descripcion, &product.precio)?;

    Ok((fields, image))
}

pub fn validate_image(image: ImagePayload) -> Result<ImagePayload, ValidationError> {
    if image.is_empty() {
        return Err(ValidationError::MissingFields);
    }

    Ok(image)
}

/// Same checks as creation, without the image.
pub fn validate_update(update: &ProductUpdate) -> Result<ProductFields, ValidationError> {
    validate_fields(&update.nombre, &update.descripcion, &update.precio)
}

/// Exact decimals first. Numbers past `Decimal`'s 28 significant digits still
/// count as long as they are finite.
pub fn is_valid_price(precio: &str) -> bool {
    let precio = precio.trim();

    Decimal::from_str(precio).is_ok() || precio.parse::<f64>().is_ok_and(f64::is_finite)
}

fn validate_fields(
    nombre: &str,
    descripcion: &str,
    precio: &str,
) -> Result<ProductFields, ValidationError> {
    if is_blank(nombre) || is_blank(descripcion) || is_blank(precio) {
        return Err(ValidationError::MissingFields);
    }

    if !is_valid_price(precio) {
        return Err(ValidationError::InvalidPrice);
    }

    Ok(ProductFields {
        nombre: nombre.to_string(),
        descripcion: descripcion.to_string(),
        precio: precio.to_string(),
    })
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use crate::models::ImagePayload;

    use super::*;

    fn elote() -> NewProduct {
        NewProduct {
            nombre: "Elote".to_string(),
            descripcion: "Con queso".to_string(),
            precio: "35".to_string(),
            imagen: Some(ImagePayload::new(vec![0xFF, 0xD8, 0xFF], None)),
        }
    }

    #[test]
    fn accepts_complete_product() -> Result<(), ValidationError> {
        let (fields, image) = validate_new_product(elote())?;

        assert_eq!(
            fields,
            ProductFields {
                nombre: "Elote".to_string(),
                descripcion: "Con queso".to_string(),
                precio: "35".to_string(),
            }
        );
        assert_eq!(image.len(), 3);

        Ok(())
    }

    #[test]
    fn rejects_each_missing_field() {
        let cases = [
            NewProduct {
                nombre: String::new(),
                ..elote()
            },
            NewProduct {
                descripcion: "   ".to_string(),
                ..elote()
            },
            NewProduct {
                precio: String::new(),
                ..elote()
            },
            NewProduct {
                imagen: None,
                ..elote()
            },
            NewProduct {
                imagen: Some(ImagePayload::default()),
                ..elote()
            },
        ];

        for case in cases {
            let label = format!("{case:?}");
            let result = validate_new_product(case).map(|(fields, _)| fields);

            assert_eq!(result, Err(ValidationError::MissingFields), "case {label}");
        }
    }

    #[test]
    fn rejects_non_numeric_price() {
        let product = NewProduct {
            precio: "abc".to_string(),
            ..elote()
        };

        let result = validate_new_product(product).map(|(fields, _)| fields);

        assert_eq!(result, Err(ValidationError::InvalidPrice));
    }

    #[test]
    fn rejects_empty_replacement_image() {
        assert!(validate_image(ImagePayload::default()).is_err());
    }

    #[test]
    fn keeps_price_text_as_given() -> Result<(), ValidationError> {
        let fields = validate_update(&ProductUpdate {
            nombre: "Esquite".to_string(),
            descripcion: "En vaso".to_string(),
            precio: "40.50".to_string(),
        })?;

        assert_eq!(fields.precio, "40.50");

        Ok(())
    }

    #[test]
    fn price_check_accepts_decimals_and_rejects_garbage() {
        assert!(is_valid_price("35"));
        assert!(is_valid_price(" 12.5 "));
        assert!(is_valid_price("-3"));
        assert!(!is_valid_price("12abc"));
        assert!(!is_valid_price("NaN"));
        assert!(!is_valid_price(""));
    }

    #[test]
    fn price_check_accepts_numbers_beyond_decimal_precision() {
        assert!(is_valid_price("100000000000000000000000000000"));
        assert!(is_valid_price("1e40"));
        assert!(!is_valid_price("inf"));
        assert!(!is_valid_price("1e400"));
    }
}
