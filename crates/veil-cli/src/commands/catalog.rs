//! `veil catalog`

use anyhow::Result;
use veil::Catalog;

use crate::style::{SemanticStyle, styled_table};

pub fn run() -> Result<()> {
    let catalog = Catalog::tpch()?;

    let mut table = styled_table(&["Query", "Class", "Items"]);
    for template in catalog.iter() {
        let items: Vec<String> = template.item_ids().iter().map(ToString::to_string).collect();
        table.add_row(vec![
            template.id().to_string(),
            template.class().to_string(),
            items.join(", "),
        ]);
    }

    println!("{table}");
    println!("{}", format!("{} templates", catalog.len()).muted());
    Ok(())
}
