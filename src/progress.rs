use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Slot values reported by the dialogue backend, keyed by field name. A
/// missing key means the slot was never set.
pub type SlotMap = BTreeMap<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate section name: {0}")]
    DuplicateSection(String),
    #[error("section {section} lists field {field} more than once")]
    DuplicateField { section: String, field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub fields: Vec<String>,
}

impl SectionSpec {
    pub fn new(name: &str, fields: &[&str]) -> Self {
        Self { name: name.to_string(), fields: fields.iter().map(|f| f.to_string()).collect() }
    }
}

/// Fixed section layout of the profile. Injected when a session starts and
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSchema {
    sections: Vec<SectionSpec>,
}

impl ProfileSchema {
    pub fn new(sections: Vec<SectionSpec>) -> Result<Self, SchemaError> {
        let mut names = HashSet::new();
        for section in &sections {
            if !names.insert(section.name.as_str()) {
                return Err(SchemaError::DuplicateSection(section.name.clone()));
            }
            let mut fields = HashSet::new();
            for field in &section.fields {
                if !fields.insert(field.as_str()) {
                    return Err(SchemaError::DuplicateField {
                        section: section.name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(Self { sections })
    }

    /// The four-section onboarding profile.
    pub fn onboarding() -> Self {
        Self {
            sections: vec![
                SectionSpec::new(
                    "Personal Information",
                    &["first_name", "middle_name", "last_name", "email", "phone_number", "address"],
                ),
                SectionSpec::new(
                    "Work Experience",
                    &["job_title", "company_name", "employment_start", "employment_end"],
                ),
                SectionSpec::new(
                    "Education",
                    &["school_name", "degree", "field_of_study", "graduation_year"],
                ),
                SectionSpec::new(
                    "Skills & Preferences",
                    &["skills", "preferred_role", "preferred_location", "expected_salary"],
                ),
            ],
        }
    }

    pub fn sections(&self) -> &[SectionSpec] {
        &self.sections
    }

    pub fn total_fields(&self) -> usize {
        self.sections.iter().map(|s| s.fields.len()).sum()
    }
}

impl Default for ProfileSchema {
    fn default() -> Self {
        Self::onboarding()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub name: String,
    pub fields: Vec<String>,
    pub completed_fields: Vec<String>,
    pub completed: bool,
}

impl Section {
    pub fn percent(&self) -> f64 {
        ratio(self.completed_fields.len(), self.fields.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileProgress {
    pub sections: Vec<Section>,
    pub overall_progress: f64,
}

impl ProfileProgress {
    pub fn empty(schema: &ProfileSchema) -> Self {
        reduce(schema, &SlotMap::new())
    }

    pub fn completed_fields(&self) -> usize {
        self.sections.iter().map(|s| s.completed_fields.len()).sum()
    }

    pub fn total_fields(&self) -> usize {
        self.sections.iter().map(|s| s.fields.len()).sum()
    }

    pub fn rounded(&self) -> u8 {
        self.overall_progress.round() as u8
    }
}

/// A slot counts as filled unless it is null, a blank string, or an empty
/// collection. `0` and `false` are real answers.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Derives progress from the schema and the latest slot map. The only way a
/// `ProfileProgress` is ever produced.
pub fn reduce(schema: &ProfileSchema, slots: &SlotMap) -> ProfileProgress {
    let sections: Vec<Section> = schema
        .sections
        .iter()
        .map(|spec| {
            let completed_fields: Vec<String> = spec
                .fields
                .iter()
                .filter(|f| slots.get(f.as_str()).is_some_and(is_filled))
                .cloned()
                .collect();
            let completed = completed_fields.len() == spec.fields.len();
            Section {
                name: spec.name.clone(),
                fields: spec.fields.clone(),
                completed_fields,
                completed,
            }
        })
        .collect();

    let done = sections.iter().map(|s| s.completed_fields.len()).sum();
    let total = sections.iter().map(|s| s.fields.len()).sum();
    ProfileProgress { sections, overall_progress: ratio(done, total) }
}

fn ratio(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * done as f64 / total as f64
}
