//! Receipt commands

use std::path::Path;

use anyhow::{Context, Result};
use spendwise_core::models::{OcrStatus, Receipt};
use spendwise_server::AppState;

use super::{audit, format_won, parse_range, truncate};

fn status_icon(status: OcrStatus) -> &'static str {
    match status {
        OcrStatus::Completed => "✓",
        OcrStatus::Failed => "✗",
        _ => "⏳",
    }
}

fn read_image(file: &Path) -> Result<Vec<u8>> {
    std::fs::read(file).with_context(|| format!("Failed to read image {}", file.display()))
}

fn print_receipt(receipt: &Receipt) {
    println!(
        "\n{} {} ({})",
        status_icon(receipt.ocr_status),
        receipt.store_name,
        receipt.ocr_status.as_str()
    );
    println!("{}", "─".repeat(50));
    println!("  ID:       {}", receipt.id);
    println!("  Date:     {}", receipt.purchase_date.format("%Y-%m-%d %H:%M"));
    println!("  Total:    {}", format_won(receipt.total_amount));
    if let Some(address) = &receipt.store_address {
        println!("  Address:  {}", address);
    }
    if let Some(phone) = &receipt.store_phone_number {
        println!("  Phone:    {}", phone);
    }
    if let Some(image) = &receipt.image_url {
        println!("  📷 {}", image);
    }
    if let Some(error) = receipt
        .ocr_raw_data
        .as_ref()
        .and_then(|raw| raw.get("error"))
        .and_then(|e| e.as_str())
    {
        println!("  ⚠️  OCR error: {}", error);
    }
    if !receipt.items.is_empty() {
        println!("  Items:");
        for item in &receipt.items {
            println!(
                "    {:<28} {:>10}  x{}",
                truncate(&item.name, 28),
                format_won(item.price),
                item.quantity
            );
        }
    }
}

/// Upload a receipt image: OCR it, store it and record its expenses
pub async fn cmd_receipts_upload(state: &AppState, user: &str, file: &Path) -> Result<()> {
    let image = read_image(file)?;
    let file_name = file.file_name().and_then(|n| n.to_str());

    println!("📤 Processing {} ({} bytes)...", file.display(), image.len());
    let processed = state
        .receipts
        .upload_and_process(user, &image, file_name)
        .await?;
    audit(
        &state.db,
        user,
        "upload",
        "receipt",
        Some(&processed.receipt.id),
        Some(&format!("expenses={}", processed.expenses.len())),
    );

    print_receipt(&processed.receipt);
    if processed.expenses.is_empty() {
        println!("\n  No expenses recorded.");
    } else {
        println!("\n  Recorded {} expense(s):", processed.expenses.len());
        for expense in &processed.expenses {
            println!(
                "    {:<24} {:>12}  {}",
                truncate(expense.item_name.as_deref().unwrap_or(&expense.store_name), 24),
                format_won(expense.amount),
                expense.category.as_str()
            );
        }
    }
    println!();
    Ok(())
}

/// OCR a receipt image and show what would be recorded
pub async fn cmd_receipts_ocr(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let image = read_image(file)?;
    let preview = state.receipts.ocr_only(&image).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    let extracted = &preview.extracted;
    println!("\n🔍 {}", extracted.store_name);
    println!("{}", "─".repeat(50));
    println!("  Date:     {}", extracted.date.format("%Y-%m-%d %H:%M"));
    println!("  Total:    {}", format_won(extracted.total_amount));
    for item in &extracted.items {
        println!("    {:<28} {:>10}", truncate(&item.name, 28), format_won(item.price));
    }
    println!(
        "  Suggested: {} ({:.0}%, {})",
        preview.suggestion.category.as_str(),
        preview.suggestion.confidence * 100.0,
        preview.suggestion.tier.as_str()
    );
    println!();
    Ok(())
}

pub fn cmd_receipts_list(
    state: &AppState,
    user: &str,
    from: Option<&str>,
    to: Option<&str>,
    limit: i64,
) -> Result<()> {
    let (start, end) = parse_range(from, to)?;
    let receipts = state.receipts.list(user, start, end, limit)?;

    if receipts.is_empty() {
        println!("No receipts found.");
        return Ok(());
    }

    println!("\n🧾 Receipts ({})", receipts.len());
    println!("{}", "─".repeat(70));
    for receipt in &receipts {
        println!(
            "  {} {}  {:<24} {:>12}  {}",
            status_icon(receipt.ocr_status),
            receipt.purchase_date.format("%Y-%m-%d"),
            truncate(&receipt.store_name, 24),
            format_won(receipt.total_amount),
            receipt.id
        );
    }
    println!();
    Ok(())
}

pub fn cmd_receipts_show(state: &AppState, user: &str, id: &str) -> Result<()> {
    let processed = state.receipts.get_with_expenses(user, id)?;
    print_receipt(&processed.receipt);

    if !processed.expenses.is_empty() {
        println!("  Expenses:");
        for expense in &processed.expenses {
            println!(
                "    {}  {:>12}  {}",
                expense.id,
                format_won(expense.amount),
                expense.category.as_str()
            );
        }
    }
    println!();
    Ok(())
}

pub fn cmd_receipts_delete(
    state: &AppState,
    user: &str,
    id: &str,
    with_expenses: bool,
) -> Result<()> {
    let deletion = state.receipts.delete(user, id, with_expenses)?;
    audit(
        &state.db,
        user,
        "delete",
        "receipt",
        Some(id),
        Some(&format!(
            "expenses_deleted={}, image_deleted={}",
            deletion.expenses_deleted, deletion.image_deleted
        )),
    );

    println!("🗑️  Deleted receipt {}", deletion.receipt_id);
    if with_expenses {
        println!("   Removed {} expense(s)", deletion.expenses_deleted);
    }
    if !deletion.image_deleted {
        println!("   No stored image to remove");
    }
    Ok(())
}
