use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::warn;

/// Curriculum seeded into the `subjects` table, in id order.
pub const CURRICULUM: [&str; 23] = [
    "german",
    "english",
    "french",
    "latin",
    "spanish",
    "russian",
    "maths",
    "physics",
    "chemistry",
    "biology",
    "computer_science",
    "geography",
    "history",
    "politics",
    "economics",
    "religion",
    "ethics",
    "philosophy",
    "psychology",
    "music",
    "art",
    "sport",
    "technology",
];

const SUBJECT_SEPARATOR: char = ',';

/// Display label for an internal subject name. Unknown names pass through.
pub fn display_label(name: &str) -> &str {
    match name {
        "german" => "Deutsch",
        "english" => "Englisch",
        "french" => "Französisch",
        "latin" => "Latein",
        "spanish" => "Spanisch",
        "russian" => "Russisch",
        "maths" => "Mathematik",
        "physics" => "Physik",
        "chemistry" => "Chemie",
        "biology" => "Biologie",
        "computer_science" => "Informatik",
        "geography" => "Erdkunde",
        "history" => "Geschichte",
        "politics" => "Politik",
        "economics" => "Wirtschaft",
        "religion" => "Religion",
        "ethics" => "Ethik",
        "philosophy" => "Philosophie",
        "psychology" => "Psychologie",
        "music" => "Musik",
        "art" => "Kunst",
        "sport" => "Sport",
        "technology" => "Technik",
        other => other,
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub label: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSubject {
    pub id: Option<i64>,
    pub name: Option<String>,
}

impl From<DbSubject> for Subject {
    fn from(db: DbSubject) -> Self {
        let name = db.name.unwrap_or_default();
        Self {
            id: db.id.unwrap_or_default(),
            label: display_label(&name).to_string(),
            name,
        }
    }
}

/// Immutable subject lookup tables built once the reference data is seeded.
#[derive(Debug, Clone, Default)]
pub struct SubjectCatalog {
    by_id: BTreeMap<i64, Subject>,
    by_name: HashMap<String, i64>,
}

impl SubjectCatalog {
    pub fn new(subjects: Vec<Subject>) -> Self {
        let by_name = subjects.iter().map(|s| (s.name.clone(), s.id)).collect();
        let by_id = subjects.into_iter().map(|s| (s.id, s)).collect();
        Self { by_id, by_name }
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.by_id.get(&id).map(|s| s.name.as_str())
    }

    /// All subjects in id order.
    pub fn all(&self) -> Vec<Subject> {
        self.by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Resolves every name, keeping input order and duplicates. The first
    /// unknown name is returned as the error.
    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<SubjectSet, String> {
        names
            .iter()
            .map(|name| self.id_of(name.as_ref()).ok_or_else(|| name.as_ref().to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map(SubjectSet)
    }

    /// Resolves the names it knows and skips the rest.
    pub fn resolve_known<S: AsRef<str>>(&self, names: &[S]) -> SubjectSet {
        SubjectSet(
            names
                .iter()
                .filter_map(|name| self.id_of(name.as_ref()))
                .collect(),
        )
    }

    /// id -> internal name -> display label; unknown ids come back as the raw id.
    pub fn label_for(&self, id: i64) -> String {
        match self.name_of(id) {
            Some(name) => display_label(name).to_string(),
            None => id.to_string(),
        }
    }
}

/// Ordered list of subject ids as stored on a tutoring registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SubjectSet(pub Vec<i64>);

impl SubjectSet {
    /// Comma-joined ids, or `None` for the empty set.
    pub fn encode(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }

        Some(
            self.0
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(&SUBJECT_SEPARATOR.to_string()),
        )
    }

    pub fn decode(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        let ids = raw
            .split(SUBJECT_SEPARATOR)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| match part.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(value = %part, "Skipping malformed subject id in stored set");
                    None
                }
            })
            .collect();

        Self(ids)
    }

    pub fn ids(&self) -> &[i64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn intersects(&self, other: &SubjectSet) -> bool {
        self.0.iter().any(|id| other.0.contains(id))
    }

    pub fn labels(&self, catalog: &SubjectCatalog) -> Vec<String> {
        self.0.iter().map(|id| catalog.label_for(*id)).collect()
    }

    pub fn names(&self, catalog: &SubjectCatalog) -> Vec<String> {
        self.0
            .iter()
            .map(|id| {
                catalog
                    .name_of(*id)
                    .map(str::to_string)
                    .unwrap_or_else(|| id.to_string())
            })
            .collect()
    }
}
