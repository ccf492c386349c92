//! Types Command
//!
//! Print the document catalog.

use serde::Serialize;

use crate::ai::DocumentCatalog;
use crate::cli::ui::Output;
use crate::cli::util::OutputFormat;
use crate::types::Result;

#[derive(Serialize)]
struct DocumentRow {
    id: &'static str,
    title: &'static str,
    dependencies: &'static [&'static str],
    sections: &'static [&'static str],
}

pub fn run(format: OutputFormat) -> Result<()> {
    let rows: Vec<DocumentRow> = DocumentCatalog::all()
        .iter()
        .map(|d| DocumentRow {
            id: d.id,
            title: d.title,
            dependencies: d.dependencies,
            sections: d.sections,
        })
        .collect();

    let out = Output::new();
    if format.is_json() {
        return out.json(&rows);
    }

    out.header("Document types");
    for row in &rows {
        println!("\n  {} - {}", row.id, row.title);
        if !row.dependencies.is_empty() {
            out.field("Depends on", row.dependencies.join(", "));
        }
        out.field("Sections", row.sections.join(" / "));
    }
    println!();
    out.info("Other type names are accepted with a generic outline");
    Ok(())
}
