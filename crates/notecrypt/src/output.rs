use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;

use notecrypt_core::item::BatchReport;

/// Create a styled table for output
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Summary of a batch run: counts, then one row per failed item.
pub fn batch_summary(report: &BatchReport) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Result", "Items"]);
    table.add_row(vec!["decrypted".to_owned(), report.decrypted.to_string()]);
    table.add_row(vec!["failed".to_owned(), report.failed.to_string()]);
    table.add_row(vec!["skipped".to_owned(), report.skipped.to_string()]);
    for failure in &report.failures {
        table.add_row(vec![
            format!("  {}", failure.uuid),
            format!("{:?}", failure.kind),
        ]);
    }
    table
}
