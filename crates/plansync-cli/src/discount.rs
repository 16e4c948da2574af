use plansync_core::{normalize, DiscountSpec};

/// Prints the canonical label for a raw discount. Integrity failures are
/// returned so the process exits non-zero.
pub(crate) fn run(kind: &str, value: &str, currency: &str, json: bool) -> anyhow::Result<()> {
    println!("{}", render(kind, value, currency, json)?);
    Ok(())
}

pub(crate) fn render(kind: &str, value: &str, currency: &str, json: bool) -> anyhow::Result<String> {
    let spec = DiscountSpec::parse(kind, value)?;
    let normalized = normalize(&spec)?;
    let label = normalized.label(currency);
    if !json {
        return Ok(label);
    }
    let out = serde_json::json!({
        "kind": normalized.kind().as_shopify_str(),
        "label": label,
        "adjustmentValue": normalized.adjustment_value(),
    });
    Ok(out.to_string())
}
