//! Declarative table catalog for the kitchen domain.
//!
//! FK translation, smart name handling, and semantic-filter eligibility are
//! all declared here per table, never inferred from data. The relational
//! schema itself lives outside the core; this catalog is only the contract
//! the tool layer enforces.

use serde::Serialize;

/// A foreign-key field and the entity type it points at.
#[derive(Debug, Clone, Copy)]
pub struct FkField {
    pub field: &'static str,
    pub target: &'static str,
}

/// Equivalence transformation applied to name-equality filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartNameRule {
    /// No transformation.
    None,
    /// `name = "X"` becomes `name ilike "%X%"`.
    IlikeContains,
    /// A best-name lookup substitutes an identifier filter.
    BestNameLookup,
}

#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub table: &'static str,
    pub entity_type: &'static str,
    pub id_field: &'static str,
    /// Field used as the human-readable label for refs.
    pub label_field: &'static str,
    pub fields: &'static [&'static str],
    pub fk_fields: &'static [FkField],
    pub smart_name: SmartNameRule,
    /// Fields on which the `similar` (semantic) operator is allowed.
    pub indexed_fields: &'static [&'static str],
    /// Parent table for linked child tables.
    pub parent: Option<&'static str>,
}

impl TableSchema {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    pub fn fk_target(&self, field: &str) -> Option<&'static str> {
        self.fk_fields
            .iter()
            .find(|fk| fk.field == field)
            .map(|fk| fk.target)
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexed_fields.contains(&field)
    }

    /// Compact field listing for step-scoped prompts.
    pub fn describe(&self) -> String {
        format!("{}: {}", self.table, self.fields.join(", "))
    }
}

pub const TABLES: &[TableSchema] = &[
    TableSchema {
        table: "recipes",
        entity_type: "recipe",
        id_field: "id",
        label_field: "name",
        fields: &[
            "id",
            "name",
            "description",
            "instructions",
            "servings",
            "total_time_minutes",
            "tags",
        ],
        fk_fields: &[],
        smart_name: SmartNameRule::IlikeContains,
        indexed_fields: &["description"],
        parent: None,
    },
    TableSchema {
        table: "recipe_ingredients",
        entity_type: "ingredient",
        id_field: "id",
        label_field: "name",
        fields: &["id", "recipe_id", "name", "quantity", "unit", "preparation"],
        fk_fields: &[FkField {
            field: "recipe_id",
            target: "recipe",
        }],
        smart_name: SmartNameRule::None,
        indexed_fields: &[],
        parent: Some("recipes"),
    },
    TableSchema {
        table: "pantry_items",
        entity_type: "pantry_item",
        id_field: "id",
        label_field: "name",
        fields: &["id", "name", "quantity", "unit", "expires_on"],
        fk_fields: &[],
        smart_name: SmartNameRule::BestNameLookup,
        indexed_fields: &[],
        parent: None,
    },
    TableSchema {
        table: "meal_plans",
        entity_type: "meal_plan",
        id_field: "id",
        label_field: "title",
        fields: &["id", "title", "week_start", "notes"],
        fk_fields: &[],
        smart_name: SmartNameRule::None,
        indexed_fields: &[],
        parent: None,
    },
    TableSchema {
        table: "meal_plan_slots",
        entity_type: "meal_slot",
        id_field: "id",
        label_field: "label",
        fields: &["id", "meal_plan_id", "recipe_id", "day", "meal", "label"],
        fk_fields: &[
            FkField {
                field: "meal_plan_id",
                target: "meal_plan",
            },
            FkField {
                field: "recipe_id",
                target: "recipe",
            },
        ],
        smart_name: SmartNameRule::None,
        indexed_fields: &[],
        parent: Some("meal_plans"),
    },
];

pub fn table(name: &str) -> Option<&'static TableSchema> {
    TABLES.iter().find(|t| t.table == name)
}

pub fn table_for_entity_type(entity_type: &str) -> Option<&'static TableSchema> {
    TABLES.iter().find(|t| t.entity_type == entity_type)
}

/// Child tables whose parent is the given table.
pub fn children_of(parent: &str) -> Vec<&'static TableSchema> {
    TABLES.iter().filter(|t| t.parent == Some(parent)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_table_and_entity_type() {
        assert_eq!(table("recipes").unwrap().entity_type, "recipe");
        assert_eq!(table_for_entity_type("meal_slot").unwrap().table, "meal_plan_slots");
        assert!(table("users").is_none());
    }

    #[test]
    fn fk_targets_are_declared() {
        let t = table("meal_plan_slots").unwrap();
        assert_eq!(t.fk_target("recipe_id"), Some("recipe"));
        assert_eq!(t.fk_target("day"), None);
    }

    #[test]
    fn recipes_have_a_linked_child() {
        let children = children_of("recipes");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].table, "recipe_ingredients");
    }

    #[test]
    fn similar_only_on_indexed_fields() {
        let t = table("recipes").unwrap();
        assert!(t.is_indexed("description"));
        assert!(!t.is_indexed("name"));
    }
}
