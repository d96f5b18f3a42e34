//! Category classification command

use anyhow::{bail, Result};
use spendwise_core::CategoryClassifier;

pub async fn cmd_classify(
    classifier: &CategoryClassifier,
    store: &str,
    item: Option<&str>,
    amount: Option<f64>,
) -> Result<()> {
    if store.trim().is_empty() {
        bail!("Store name cannot be empty");
    }

    let result = classifier.classify(store, item, amount).await;

    println!("\n🏷️  {}", result.category.as_str());
    println!("{}", "─".repeat(40));
    println!("  Code:        {}", result.category.code());
    println!("  Meaning:     {}", result.category.description());
    println!("  Confidence:  {:.0}%", result.confidence * 100.0);
    println!("  Decided by:  {}", result.tier.as_str());
    if !classifier.has_model() {
        println!("  (no local model configured, keyword rules only)");
    }

    let text = match item {
        Some(item) => format!("{} {}", store, item),
        None => store.to_string(),
    };
    let suggestions = classifier.suggest(&text);
    if !suggestions.is_empty() {
        println!("\n  Related categories:");
        for suggestion in &suggestions {
            println!(
                "    {} ({})",
                suggestion.category.as_str(),
                suggestion.matched_keywords.join(", ")
            );
        }
    }
    println!();
    Ok(())
}
