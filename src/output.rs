use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::import::ImportedInstance;

#[derive(Tabled)]
struct ImportedRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Provider")]
    provider: String,
}

impl From<&ImportedInstance> for ImportedRow {
    fn from(instance: &ImportedInstance) -> Self {
        Self {
            address: instance.address.to_string(),
            resource_type: instance.address.resource_type.clone(),
            id: instance.id.clone(),
            provider: instance.provider.clone(),
        }
    }
}

pub fn imported_table(imported: &[ImportedInstance]) -> String {
    let rows: Vec<ImportedRow> = imported.iter().map(ImportedRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn success_message(imported: &[ImportedInstance]) -> String {
    format!(
        "Import successful!\n\n\
         {}\n\n\
         The resources that were imported are shown above. These resources are now in\n\
         your Terraform state and will henceforth be managed by Terraform.",
        imported_table(imported)
    )
}
