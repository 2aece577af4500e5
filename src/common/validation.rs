// src/common/validation.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use validator::{ValidationError, ValidationErrors};

use crate::common::error::AppError;

/// Maior valor que cabe em NUMERIC(14, 2).
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

// ---
// Validação Customizada
// ---
pub fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() && !val.is_zero() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

/// Preço unitário: não negativo e dentro do limite das colunas monetárias.
pub fn validate_unit_price(val: &Decimal) -> Result<(), ValidationError> {
    validate_not_negative(val)?;
    if *val > max_amount() {
        let mut err = ValidationError::new("range");
        err.message = Some("O preço excede o limite permitido.".into());
        return Err(err);
    }
    Ok(())
}

/// `quantidade * preço`, recusando o que não cabe numa coluna monetária.
pub fn line_amount(quantity: i32, unit_price: Decimal) -> Result<Decimal, AppError> {
    Decimal::from(quantity)
        .checked_mul(unit_price)
        .and_then(within_amount_limit)
        .ok_or_else(amount_overflow)
}

/// Soma valores monetários com o mesmo limite de `line_amount`.
pub fn sum_amounts(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, AppError> {
    values.into_iter().try_fold(Decimal::ZERO, |total, value| {
        total.checked_add(value).and_then(within_amount_limit).ok_or_else(amount_overflow)
    })
}

fn within_amount_limit(value: Decimal) -> Option<Decimal> {
    (value.abs() <= max_amount()).then_some(value)
}

fn amount_overflow() -> AppError {
    invalid_field("items", "amount_overflow", "O valor total excede o limite permitido.")
}

pub fn quantity_overflow() -> AppError {
    invalid_field("items", "quantity_overflow", "A quantidade somada excede o limite permitido.")
}

/// Campo ausente vira `None`; `null` explícito vira `Some(None)` (limpar).
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Monta um `AppError::ValidationError` para regras entre campos, mantendo o
/// mesmo formato de resposta das validações do derive.
pub fn invalid_field(field: &'static str, code: &'static str, message: &'static str) -> AppError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    let mut errors = ValidationErrors::new();
    errors.add(field, err);
    AppError::ValidationError(errors)
}

/// Achata os erros (inclusive os aninhados de listas) em mensagens legíveis.
pub fn flatten_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut out = Vec::new();
    collect(errors, "", &mut out);
    out.sort();
    out
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for e in field_errors {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    out.push(format!("{}: {}", path, message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_positive_are_accepted() {
        assert!(validate_not_negative(&Decimal::ZERO).is_ok());
        assert!(validate_not_negative(&Decimal::new(1050, 2)).is_ok());
    }

    #[test]
    fn negative_is_rejected_with_message() {
        let err = validate_not_negative(&Decimal::new(-1, 0)).unwrap_err();
        assert_eq!(err.code, "range");
        assert!(err.message.is_some());
    }

    #[test]
    fn price_above_the_column_limit_is_rejected() {
        assert!(validate_unit_price(&max_amount()).is_ok());
        assert!(validate_unit_price(&Decimal::MAX).is_err());
        assert!(validate_unit_price(&Decimal::new(-1, 2)).is_err());
    }

    #[test]
    fn amounts_that_do_not_fit_are_validation_errors() {
        assert_eq!(line_amount(3, Decimal::new(1050, 2)).unwrap(), Decimal::new(3150, 2));
        assert!(matches!(line_amount(2, Decimal::MAX), Err(AppError::ValidationError(_))));
        assert!(matches!(sum_amounts([max_amount(), Decimal::ONE]), Err(AppError::ValidationError(_))));
        assert_eq!(sum_amounts([Decimal::ONE, Decimal::TWO]).unwrap(), Decimal::from(3));
    }

    #[derive(Debug, serde::Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        notes: Option<Option<String>>,
    }

    #[test]
    fn explicit_null_is_distinct_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let cleared: Patch = serde_json::from_str(r#"{"notes": null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"notes": "x"}"#).unwrap();

        assert_eq!(absent.notes, None);
        assert_eq!(cleared.notes, Some(None));
        assert_eq!(set.notes, Some(Some("x".to_string())));
    }

    #[test]
    fn invalid_field_is_reported_with_path() {
        let AppError::ValidationError(errors) =
            invalid_field("fromWarehouseId", "same_warehouse", "Origem e destino iguais.")
        else {
            panic!("esperava ValidationError");
        };
        assert_eq!(
            flatten_messages(&errors),
            vec!["fromWarehouseId: Origem e destino iguais.".to_string()]
        );
    }
}
