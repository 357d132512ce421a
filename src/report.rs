use crate::scanner::{ScanReport, ScanRow, Skipped};
use chrono::{DateTime, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_BORDERS_ONLY,
};

fn format_opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.decimals$}"))
}

fn change_style(pct: f64) -> (Color, &'static str) {
    if pct >= 0.0 {
        (Color::Green, "▲")
    } else {
        (Color::Red, "▼")
    }
}

/// Headline shown above the cards.
pub fn summary_line(report: &ScanReport, exchange: &str, taken_at: DateTime<Utc>) -> String {
    let when = taken_at.format("%d-%m-%Y %H:%M:%S");
    if report.is_empty() {
        format!(
            "No matches among {} {} pairs (data taken at {} UTC).",
            report.universe, exchange, when
        )
    } else {
        format!(
            "{} of {} {} pairs match (data taken at {} UTC).",
            report.rows.len(),
            report.universe,
            exchange,
            when
        )
    }
}

/// A small bordered card for one match.
pub fn card(row: &ScanRow) -> Table {
    let (color, icon) = change_style(row.pct_change);

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new(row.symbol.as_str()).add_attribute(Attribute::Bold),
        ]);

    table.add_row(vec![
        Cell::new(format!(
            "Close: {} ({} {:.2}%)",
            row.close,
            icon,
            row.pct_change.abs()
        ))
        .fg(color)
        .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![Cell::new(format!(
        "MA20: {} | MA50: {}",
        format_opt(row.ma20, 4),
        format_opt(row.ma50, 4)
    ))]);
    table.add_row(vec![Cell::new(format!(
        "RSI: {} | Volume/Avg: {:.2}",
        format_opt(row.rsi, 2),
        row.volume_ratio
    ))]);
    table
}

/// All matches as one table, in scan order.
pub fn results_table(rows: &[ScanRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Symbol").add_attribute(Attribute::Bold),
            Cell::new("Close")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("Change %")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("MA20").add_attribute(Attribute::Bold),
            Cell::new("MA50").add_attribute(Attribute::Bold),
            Cell::new("RSI").add_attribute(Attribute::Bold),
            Cell::new("Vol x").add_attribute(Attribute::Bold),
        ]);

    for (i, row) in rows.iter().enumerate() {
        let (color, _) = change_style(row.pct_change);
        table.add_row(vec![
            Cell::new(i + 1).fg(Color::DarkGrey),
            Cell::new(row.symbol.as_str()).fg(Color::Cyan),
            Cell::new(row.close).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", row.pct_change))
                .fg(color)
                .set_alignment(CellAlignment::Right),
            Cell::new(format_opt(row.ma20, 4)),
            Cell::new(format_opt(row.ma50, 4)),
            Cell::new(format_opt(row.rsi, 2)),
            Cell::new(format!("{:.2}", row.volume_ratio)),
        ]);
    }
    table
}

pub fn skipped_table(skipped: &[Skipped]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Skipped").add_attribute(Attribute::Bold),
            Cell::new("Reason").add_attribute(Attribute::Bold),
        ]);
    for entry in skipped {
        table.add_row(vec![
            Cell::new(entry.symbol.as_str()).fg(Color::DarkGrey),
            Cell::new(entry.reason.to_string()).fg(Color::DarkGrey),
        ]);
    }
    table
}

pub fn print_report(report: &ScanReport, exchange: &str, taken_at: DateTime<Utc>, show_skipped: bool) {
    println!("\n{}", summary_line(report, exchange, taken_at));

    for row in &report.rows {
        println!("{}", card(row));
    }
    if !report.rows.is_empty() {
        println!("\n{}", results_table(&report.rows));
    }

    if !report.skipped.is_empty() {
        if show_skipped {
            println!("\n{}", skipped_table(&report.skipped));
        } else {
            println!(
                "{} symbols skipped (fetch errors or short history); use --show-skipped for details.",
                report.skipped.len()
            );
        }
    }
}
