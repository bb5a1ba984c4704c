//! TypeScript source templates.
//!
//! Renders the three per-table artifacts plus the aggregate index and
//! loggable-models configuration. Every file starts with a header carrying a
//! `Generated:` line; the semantic comparator ignores that line when deciding
//! whether a rewrite is needed.

use super::relationships::{ProcessedRelationships, RelationshipKind, RelationshipRegistration};
use crate::diagnostic::{GeneratorError, Result};
use crate::naming::{file_stem, model_name};
use crate::registry::Service;
use crate::schema::TablePatterns;

/// Template names, used in rendering errors.
pub mod template_names {
    pub const DATA_INTERFACE: &str = "data_interface";
    pub const ACTIVE_MODEL: &str = "active_model";
    pub const REACTIVE_MODEL: &str = "reactive_model";
    pub const INDEX: &str = "index";
    pub const CONFIG: &str = "loggable_config";
}

/// A column rendered as an interface property.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProperty {
    pub name: String,
    pub ts_type: String,
    pub optional: bool,
    pub comment: Option<String>,
}

/// Everything the per-table templates read.
#[derive(Debug, Clone)]
pub struct ModelTemplate {
    pub table: String,
    pub model_name: String,
    pub interface_name: String,
    pub stem: String,
    pub primary_key: Option<String>,
    pub columns: Vec<ColumnProperty>,
    pub relationships: ProcessedRelationships,
    pub patterns: TablePatterns,
    pub defaults: Vec<(String, String)>,
    pub generated_at: String,
}

/// One row of the loggable-models configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggableEntry {
    pub table: String,
    pub model_name: String,
    pub includes_loggable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    // Data interface
    // =========================================================================

    pub fn render_data_interface(&self, t: &ModelTemplate) -> Result<String> {
        check(template_names::DATA_INTERFACE, t)?;
        let name = &t.interface_name;

        let mut output = String::new();
        output.push_str(&format!("// Generated: {}\n", t.generated_at));
        output.push_str(&format!("// TypeScript types for the {} table\n", t.table));
        output.push_str(&format!(
            "// Do not edit manually - regenerate with: modelgen generate --table {}\n\n",
            t.table
        ));

        for import in &t.relationships.imports {
            output.push_str(import);
            output.push('\n');
        }
        if !t.relationships.imports.is_empty() {
            output.push('\n');
        }

        output.push_str("/**\n");
        output.push_str(&format!(" * Data shape of a {} record\n", t.model_name));
        if !t.relationships.documentation.is_empty() {
            output.push_str(" *\n * Relationships:\n");
            for line in &t.relationships.documentation {
                output.push_str(&format!(" * - {}\n", line));
            }
        }
        output.push_str(" */\n");

        output.push_str(&format!("export interface {} {{\n", name));
        for column in &t.columns {
            output.push_str(&format!(
                "  {}{}: {};",
                column.name,
                if column.optional { "?" } else { "" },
                column.ts_type
            ));
            if let Some(comment) = &column.comment {
                output.push_str(&format!(" // {}", comment.replace('\n', " ")));
            }
            output.push('\n');
        }
        if !t.relationships.properties.is_empty() {
            output.push_str("\n  // Relationships (present when loaded via includes)\n");
            for property in &t.relationships.properties {
                output.push_str(&format!("  {}?: {};\n", property.name, property.ts_type));
            }
        }
        output.push_str("}\n\n");

        output.push_str(&format!(
            "export type Create{} = Omit<{}, {}>;\n\n",
            name,
            name,
            key_union(&t.relationships.create_exclusions)
        ));
        output.push_str(&format!(
            "export type Update{} = Partial<Omit<{}, {}>>;\n",
            name,
            name,
            key_union(&t.relationships.update_exclusions)
        ));

        Ok(output)
    }

    // =========================================================================
    // Models
    // =========================================================================

    pub fn render_active_model(&self, t: &ModelTemplate) -> Result<String> {
        check(template_names::ACTIVE_MODEL, t)?;
        let class = &t.model_name;
        let iface = &t.interface_name;

        let mut output = String::new();
        output.push_str("/**\n");
        output.push_str(&format!(" * {} - ActiveRecord model (non-reactive)\n", class));
        output.push_str(" *\n");
        output.push_str(&format!(" * Read-write access to the {} table.\n", t.table));
        output.push_str(&format!(" * Generated: {}\n", t.generated_at));
        output.push_str(" */\n\n");

        output.push_str("import { createActiveRecord } from './base/active-record';\n");
        if !t.relationships.registrations.is_empty() {
            output.push_str("import { registerModelRelationships } from './base/scoped-query-base';\n");
        }
        output.push_str(&format!(
            "import type {{ {iface}, Create{iface}, Update{iface} }} from './types/{}-data';\n\n",
            t.stem
        ));

        let config = format!("{}Config", class);
        output.push_str(&model_config(&config, class, t));
        output.push_str(&format!(
            "export const {} = createActiveRecord<{iface}, Create{iface}, Update{iface}>({});\n",
            class, config
        ));

        output.push_str(&model_extras(class, t));
        output.push_str(&format!(
            "\nexport type {{ {iface}, Create{iface}, Update{iface} }};\n"
        ));
        Ok(output)
    }

    /// Same template context as the active model; only the factory differs.
    pub fn render_reactive_model(&self, t: &ModelTemplate) -> Result<String> {
        check(template_names::REACTIVE_MODEL, t)?;
        let class = format!("Reactive{}", t.model_name);
        let iface = &t.interface_name;

        let mut output = String::new();
        output.push_str("/**\n");
        output.push_str(&format!(" * {} - reactive query model\n", class));
        output.push_str(" *\n");
        output.push_str(&format!(" * Live, read-only queries over the {} table.\n", t.table));
        output.push_str(&format!(" * Generated: {}\n", t.generated_at));
        output.push_str(" */\n\n");

        output.push_str("import { createReactiveRecord } from './base/reactive-record';\n");
        if !t.relationships.registrations.is_empty() {
            output.push_str("import { registerModelRelationships } from './base/scoped-query-base';\n");
        }
        output.push_str(&format!(
            "import type {{ {} }} from './types/{}-data';\n\n",
            iface, t.stem
        ));

        let config = format!("{}Config", class);
        output.push_str(&model_config(&config, &class, t));
        output.push_str(&format!(
            "export const {} = createReactiveRecord<{}>({});\n",
            class, iface, config
        ));

        output.push_str(&model_extras(&class, t));
        output.push_str(&format!("\nexport type {{ {} }};\n", iface));
        Ok(output)
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// The models index: client initialization re-exports plus an import
    /// example for every generated model.
    pub fn render_index(&self, tables: &[String], generated_at: &str) -> Result<String> {
        if tables.iter().any(|t| t.trim().is_empty()) {
            return Err(GeneratorError::TemplateRendering {
                template: template_names::INDEX.to_string(),
                message: "table list contains an empty name".to_string(),
            });
        }

        let mut output = String::new();
        output.push_str("/**\n");
        output.push_str(" * Generated models index\n");
        output.push_str(&format!(" * Generated: {}\n", generated_at));
        output.push_str(" *\n");
        output.push_str(" * Import models directly from their own files:\n");
        for table in tables {
            let model = model_name(table);
            let stem = file_stem(table);
            output.push_str(&format!(" *   import {{ {} }} from '$lib/models/{}';\n", model, stem));
            output.push_str(&format!(
                " *   import {{ Reactive{} }} from '$lib/models/reactive-{}';\n",
                model, stem
            ));
        }
        output.push_str(" *\n");
        output.push_str(" * Migrating from the legacy per-table files:\n");
        output.push_str(" *   - `import { Users } from '$lib/models/users'` becomes\n");
        output.push_str(" *     `import { User } from '$lib/models/user'`\n");
        output.push_str(" *   - reactive queries move to the `reactive-<model>` files\n");
        output.push_str(" */\n\n");

        output.push_str("export { initializeClient, getClient, resetClient } from './base/client';\n");
        output.push_str("export type { ClientOptions } from './base/client';\n");
        Ok(output)
    }

    /// The loggable-models configuration file.
    pub fn render_config(&self, entries: &[LoggableEntry], generated_at: &str) -> Result<String> {
        if let Some(bad) = entries.iter().find(|e| e.table.trim().is_empty() || e.model_name.trim().is_empty()) {
            return Err(GeneratorError::TemplateRendering {
                template: template_names::CONFIG.to_string(),
                message: format!("entry '{}' has an empty table or model name", bad.table),
            });
        }

        let mut output = String::new();
        output.push_str("/**\n");
        output.push_str(" * Loggable models configuration\n");
        output.push_str(&format!(" * Generated: {}\n", generated_at));
        output.push_str(" *\n");
        output.push_str(" * Maps each table to its model and whether it records activity logs.\n");
        output.push_str(" */\n\n");

        output.push_str("export interface LoggableModelInfo {\n");
        output.push_str("  modelName: string;\n");
        output.push_str("  includesLoggable: boolean;\n");
        output.push_str("}\n\n");

        output.push_str("export const LOGGABLE_MODELS: Record<string, LoggableModelInfo> = {\n");
        for entry in entries {
            output.push_str(&format!(
                "  {}: {{ modelName: '{}', includesLoggable: {} }},\n",
                entry.table, entry.model_name, entry.includes_loggable
            ));
        }
        output.push_str("};\n\n");

        output.push_str("export function isLoggable(tableName: string): boolean {\n");
        output.push_str("  return LOGGABLE_MODELS[tableName]?.includesLoggable ?? false;\n");
        output.push_str("}\n\n");

        output.push_str("export function getModelName(tableName: string): string | undefined {\n");
        output.push_str("  return LOGGABLE_MODELS[tableName]?.modelName;\n");
        output.push_str("}\n");
        Ok(output)
    }
}

impl Service for TemplateRenderer {}

fn check(template: &str, t: &ModelTemplate) -> Result<()> {
    let problem = if t.table.trim().is_empty() {
        Some("table name is empty")
    } else if t.model_name.trim().is_empty() {
        Some("model name is empty")
    } else if t.interface_name.trim().is_empty() {
        Some("interface name is empty")
    } else if t.stem.trim().is_empty() {
        Some("file stem is empty")
    } else {
        None
    };

    match problem {
        Some(message) => Err(GeneratorError::TemplateRendering {
            template: template.to_string(),
            message: message.to_string(),
        }),
        None => Ok(()),
    }
}

fn key_union(keys: &[String]) -> String {
    if keys.is_empty() {
        return "never".to_string();
    }
    keys.iter()
        .map(|k| format!("'{}'", k))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn model_config(config: &str, class: &str, t: &ModelTemplate) -> String {
    let mut output = String::new();
    output.push_str(&format!("const {} = {{\n", config));
    output.push_str(&format!("  tableName: '{}',\n", t.table));
    output.push_str(&format!("  className: '{}',\n", class));
    if let Some(pk) = &t.primary_key {
        output.push_str(&format!("  primaryKey: '{}',\n", pk));
    }
    if let Some(column) = &t.patterns.soft_deletion {
        output.push_str(&format!("  softDeleteColumn: '{}',\n", column));
    }
    if let Some(column) = &t.patterns.positioning {
        output.push_str(&format!("  positionColumn: '{}',\n", column));
    }
    if !t.patterns.timestamps.is_empty() {
        output.push_str(&format!(
            "  timestamps: [{}],\n",
            t.patterns
                .timestamps
                .iter()
                .map(|c| format!("'{}'", c))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    output.push_str("};\n\n");
    output
}

/// Scopes, defaults, polymorphic declarations and relationship registrations.
fn model_extras(class: &str, t: &ModelTemplate) -> String {
    let mut output = String::new();

    if let Some(column) = &t.patterns.soft_deletion {
        output.push_str("\n// Soft deletion scopes\n");
        output.push_str(&format!("export const {}Scopes = {{\n", class));
        output.push_str(&format!("  kept: () => {}.where({{ {}: null }}),\n", class, column));
        output.push_str(&format!("  discarded: () => {}.whereNot({{ {}: null }}),\n", class, column));
        output.push_str(&format!("  withDiscarded: () => {}.unscoped(),\n", class));
        output.push_str("};\n");
    }

    if !t.defaults.is_empty() {
        output.push_str("\n// Column defaults declared by the schema\n");
        output.push_str(&format!(
            "export const {}Defaults: Partial<{}> = {{\n",
            class, t.interface_name
        ));
        for (column, literal) in &t.defaults {
            output.push_str(&format!("  {}: {},\n", column, literal));
        }
        output.push_str("};\n");
    }

    if !t.relationships.polymorphic.is_empty() {
        output.push_str("\n// Polymorphic associations\n");
        output.push_str(&format!("export const {}Polymorphic = {{\n", class));
        for decl in &t.relationships.polymorphic {
            output.push_str(&format!("  {}: {{\n", decl.name));
            output.push_str(&format!("    typeField: '{}',\n", decl.type_field));
            output.push_str(&format!("    idField: '{}',\n", decl.id_field));
            output.push_str(&format!(
                "    allowedTypes: [{}] as const,\n",
                decl.target_types
                    .iter()
                    .map(|k| format!("'{}'", k))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
            output.push_str("  },\n");
        }
        output.push_str("};\n");
    }

    if !t.relationships.registrations.is_empty() {
        output.push_str("\n// Relationship registration\n");
        output.push_str(&format!("registerModelRelationships('{}', {{\n", t.table));
        for registration in &t.relationships.registrations {
            output.push_str(&format!("  {},\n", registration_entry(registration)));
        }
        output.push_str("});\n");
    }

    output
}

fn registration_entry(r: &RelationshipRegistration) -> String {
    let mut fields = vec![format!("type: '{}'", r.kind.registration_name())];
    if let Some(model) = &r.target_model {
        fields.push(format!("model: '{}'", model));
    }
    if let Some(fk) = &r.foreign_key {
        fields.push(format!("foreignKey: '{}'", fk));
    }
    if let Some(through) = &r.through {
        fields.push(format!("through: '{}'", through));
    }
    if r.kind == RelationshipKind::Polymorphic {
        fields.push("polymorphic: true".to_string());
    }
    format!("{}: {{ {} }}", r.name, fields.join(", "))
}
