use anyhow::{anyhow, Result};
use paramtree::tree::{validate_leaf, RestrictionSet, ValueType};
use paramtree::Validity;
use serde::Serialize;

use crate::common;

#[derive(Debug, Serialize)]
struct ValidateResponse<'a> {
    value: &'a str,
    value_type: &'a str,
    status: &'static str,
    message: Option<&'a str>,
}

/// Validate one value the same way a leaf of that type would.
pub fn check(value_type: &str, restrictions: Option<&str>, value: &str) -> Result<Validity> {
    let parsed = ValueType::from_decl(value_type)
        .ok_or_else(|| anyhow!("unknown value type '{value_type}'"))?;
    let restrictions = restrictions.map(RestrictionSet::from_json);
    Ok(validate_leaf(value, parsed, restrictions.as_ref()))
}

pub fn run(value_type: &str, restrictions: Option<&str>, value: &str, json: bool) -> Result<()> {
    let verdict = check(value_type, restrictions, value)?;
    if json {
        common::print_json(&ValidateResponse {
            value,
            value_type,
            status: common::status_label(&verdict),
            message: verdict.message(),
        })?;
    } else {
        match verdict.message() {
            Some(message) => println!("{}: {message}", common::status_label(&verdict)),
            None => println!("{}", common::status_label(&verdict)),
        }
    }
    Ok(())
}
