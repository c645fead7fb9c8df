//! Maps student ids to dense classifier labels and back.

use serde::{Deserialize, Serialize};

/// Dense zero-based class index used internally by the classifier.
pub type LabelId = usize;

/// Bijective mapping between enrolled student ids and dense label ids.
///
/// Rebuilt from scratch on every training run: labels are indices into the
/// sorted list of distinct student ids, so the numbering is deterministic
/// for a given enrollment set but may be renumbered by the next retrain.
/// A registry is only meaningful next to the model trained with it; the
/// two are persisted together as one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRegistry {
    students: Vec<String>,
}

impl LabelRegistry {
    /// Build a registry from the student ids seen in a training batch.
    /// Duplicates collapse; input order does not matter.
    pub fn from_student_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut students: Vec<String> = ids.into_iter().map(Into::into).collect();
        students.sort_unstable();
        students.dedup();
        Self { students }
    }

    /// Label for a student id, if enrolled.
    pub fn label_of(&self, student_id: &str) -> Option<LabelId> {
        self.students
            .binary_search_by(|s| s.as_str().cmp(student_id))
            .ok()
    }

    /// Student id behind a label produced by the paired model.
    pub fn student_of(&self, label: LabelId) -> Option<&str> {
        self.students.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}
