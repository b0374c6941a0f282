use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::consistency::ConsistencyBlock;
use crate::error::ReconError;
use crate::normalize::normalize_header;

/// Production mapping for the nine document types of a loan file.
const BUILTIN_REGISTRY: &str = include_str!("../registry/default.toml");

// ---------------------------------------------------------------------------
// Field specs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Text,
    Number,
    Date,
    Rate,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
            Self::Rate => write!(f, "rate"),
        }
    }
}

/// Non-generic comparison overriding the type dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialRule {
    /// Source validity month within N months before the reference disbursement month.
    DisbursementWindow,
    /// Reference monthly rate vs source rate of unknown basis, within tolerance.
    RateTolerance,
    /// Every reference name component must appear in the source full name.
    FullNameComponents,
}

impl SpecialRule {
    fn required_type(self) -> ValueType {
        match self {
            Self::DisbursementWindow => ValueType::Date,
            Self::RateTolerance => ValueType::Rate,
            Self::FullNameComponents => ValueType::Text,
        }
    }
}

impl std::fmt::Display for SpecialRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DisbursementWindow => write!(f, "disbursement_window"),
            Self::RateTolerance => write!(f, "rate_tolerance"),
            Self::FullNameComponents => write!(f, "full_name_components"),
        }
    }
}

/// How to obtain and compare one semantic field for one document type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub source_column: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_rule: Option<SpecialRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column_secondary: Option<String>,
    /// Compare `source_column` against `source_column_secondary`, no reference value involved.
    #[serde(default)]
    pub cross_reference: bool,
}

impl FieldSpec {
    /// Plain reference-vs-source spec.
    pub fn new(source_column: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            source_column: source_column.into(),
            value_type,
            special_rule: None,
            source_column_secondary: None,
            cross_reference: false,
        }
    }

    pub fn with_rule(mut self, rule: SpecialRule) -> Self {
        self.special_rule = Some(rule);
        self
    }

    /// Source-internal check between two columns.
    pub fn cross(a: impl Into<String>, b: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            source_column: a.into(),
            value_type,
            special_rule: None,
            source_column_secondary: Some(b.into()),
            cross_reference: true,
        }
    }

    fn shape_error(&self) -> Option<String> {
        if self.source_column.trim().is_empty() {
            return Some("source_column is blank".into());
        }
        match (&self.source_column_secondary, self.cross_reference) {
            (None, true) => {
                return Some("cross_reference requires source_column_secondary".into());
            }
            (Some(_), false) => {
                return Some("source_column_secondary is only valid with cross_reference".into());
            }
            (Some(b), true) if b.trim().is_empty() => {
                return Some("source_column_secondary is blank".into());
            }
            _ => {}
        }
        if let Some(rule) = self.special_rule {
            if self.cross_reference {
                return Some(format!("special_rule '{rule}' cannot apply to a cross_reference spec"));
            }
            if rule.required_type() != self.value_type {
                return Some(format!(
                    "special_rule '{rule}' requires value_type '{}', found '{}'",
                    rule.required_type(),
                    self.value_type
                ));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Document mapping
// ---------------------------------------------------------------------------

/// One output field and its ordered alternative specs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldMapping {
    pub name: String,
    pub specs: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentMapping {
    pub name: String,
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldMapping>,
}

// ---------------------------------------------------------------------------
// Reference + source accessors
// ---------------------------------------------------------------------------

/// How reference-side values are located.
///
/// All names are matched after `normalize_header`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceAccessors {
    /// Exact header names accepted for the operation identifier, in preference order.
    pub key_aliases: Vec<String>,
    /// Fallback: first header containing this fragment.
    pub key_fragment: Option<String>,
    /// Given names then surnames, in display order.
    pub name_components: Vec<String>,
    /// Fields whose reference value is synthesized from `name_components`.
    pub full_name_fields: Vec<String>,
    /// Field -> reference column, when they differ.
    pub columns: BTreeMap<String, String>,
    /// Field -> fallback column read when the primary one is blank.
    pub aliases: BTreeMap<String, String>,
}

impl Default for ReferenceAccessors {
    fn default() -> Self {
        Self {
            key_aliases: vec!["OPERACION".into()],
            key_fragment: Some("OPER".into()),
            name_components: Vec::new(),
            full_name_fields: Vec::new(),
            columns: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }
}

impl ReferenceAccessors {
    pub fn is_full_name_field(&self, field: &str) -> bool {
        let f = normalize_header(field);
        self.full_name_fields.iter().any(|n| normalize_header(n) == f)
    }

    /// Reference column holding `field`.
    pub fn column_for(&self, field: &str) -> String {
        let f = normalize_header(field);
        self.columns
            .iter()
            .find(|(k, _)| normalize_header(k) == f)
            .map(|(_, v)| normalize_header(v))
            .unwrap_or(f)
    }

    pub fn alias_for(&self, field: &str) -> Option<String> {
        let f = normalize_header(field);
        self.aliases
            .iter()
            .find(|(k, _)| normalize_header(k) == f)
            .map(|(_, v)| normalize_header(v))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSettings {
    /// Operation identifier column of the source table.
    pub key_column: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            key_column: "Numero credito".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable `document type -> field -> [spec]` schema, loaded once per process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub reference: ReferenceAccessors,
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(rename = "document")]
    pub documents: Vec<DocumentMapping>,
    #[serde(default, rename = "consistency")]
    pub consistency: Vec<ConsistencyBlock>,
}

fn default_name() -> String {
    "unnamed".into()
}

impl Registry {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let registry: Registry =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    /// The embedded production registry.
    pub fn builtin() -> Result<Self, ReconError> {
        Self::from_toml(BUILTIN_REGISTRY)
    }

    pub fn document_names(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn document(&self, name: &str) -> Option<&DocumentMapping> {
        let n = normalize_header(name);
        self.documents.iter().find(|d| normalize_header(&d.name) == n)
    }

    pub fn spec_count(&self) -> usize {
        self.documents
            .iter()
            .flat_map(|d| &d.fields)
            .map(|f| f.specs.len())
            .sum()
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.documents.is_empty() {
            return Err(ReconError::ConfigValidation(
                "registry declares no document types".into(),
            ));
        }
        if self.source.key_column.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "source.key_column is blank".into(),
            ));
        }
        if self.reference.key_aliases.is_empty() && self.reference.key_fragment.is_none() {
            return Err(ReconError::ConfigValidation(
                "reference needs key_aliases or key_fragment".into(),
            ));
        }

        let mut documents_seen = HashSet::new();
        for doc in &self.documents {
            if doc.name.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "document type with blank name".into(),
                ));
            }
            if !documents_seen.insert(normalize_header(&doc.name)) {
                return Err(ReconError::DuplicateDocument(doc.name.clone()));
            }

            let mut fields_seen = HashSet::new();
            for field in &doc.fields {
                let invalid = |reason: String| ReconError::InvalidSpec {
                    document: doc.name.clone(),
                    field: field.name.clone(),
                    reason,
                };

                if field.name.trim().is_empty() {
                    return Err(invalid("field name is blank".into()));
                }
                if !fields_seen.insert(normalize_header(&field.name)) {
                    return Err(ReconError::DuplicateField {
                        document: doc.name.clone(),
                        field: field.name.clone(),
                    });
                }
                if field.specs.is_empty() {
                    return Err(invalid("no field specs".into()));
                }

                let mut columns_seen = HashSet::new();
                for spec in &field.specs {
                    if let Some(reason) = spec.shape_error() {
                        return Err(invalid(reason));
                    }
                    let column_key = (
                        spec.source_column.clone(),
                        spec.source_column_secondary.clone(),
                    );
                    if !columns_seen.insert(column_key) {
                        return Err(invalid(format!(
                            "source column '{}' listed twice",
                            spec.source_column
                        )));
                    }
                    if spec.special_rule == Some(SpecialRule::FullNameComponents)
                        && self.reference.name_components.is_empty()
                    {
                        return Err(invalid(
                            "full_name_components needs reference.name_components".into(),
                        ));
                    }
                }
            }
        }

        for block in &self.consistency {
            if block.columns.len() < 2 {
                return Err(ReconError::ConfigValidation(format!(
                    "consistency block '{}' needs at least 2 columns",
                    block.name
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
