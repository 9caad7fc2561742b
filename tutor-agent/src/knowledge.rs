//! Deterministic keyword lookup over static tutor answers.
//!
//! Course and FAQ answers are matched by plain substring containment on the
//! lowercased message; personal and course-list triggers must appear as
//! whole words. There is no scoring. The first hit in lookup order wins.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::types::AnswerSource;

/// Built-in knowledge tables.
const DEFAULT_KNOWLEDGE_YAML: &str = include_str!("../data/knowledge.yaml");

/// Error types for knowledge tables.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    /// Tables could not be parsed
    #[error("Failed to parse knowledge base: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Tables file could not be read
    #[error("Failed to read knowledge base: {0}")]
    Io(#[from] std::io::Error),

    /// Tables parsed but are not usable
    #[error("Invalid knowledge base: {0}")]
    Invalid(String),
}

/// A keyword and its canned answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub keyword: String,
    pub answer: String,
}

/// Keyword table for one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseTable {
    /// Course id as used in enrollments
    pub id: String,
    /// Display name
    pub name: String,
    /// Entries in match order
    #[serde(default)]
    pub entries: Vec<KnowledgeEntry>,
}

/// Where a knowledge answer came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeSource {
    StudentProfile,
    Course { id: String },
    GeneralFaq,
    CourseList,
}

impl KnowledgeSource {
    /// Answer source label for this knowledge source.
    pub fn answer_source(&self) -> AnswerSource {
        match self {
            KnowledgeSource::StudentProfile => AnswerSource::StudentProfile,
            KnowledgeSource::Course { .. } => AnswerSource::CourseMaterials,
            KnowledgeSource::GeneralFaq => AnswerSource::GeneralFaq,
            KnowledgeSource::CourseList => AnswerSource::CourseList,
        }
    }
}

/// A matched knowledge answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeAnswer {
    pub text: String,
    pub source: KnowledgeSource,
}

/// Static keyword-to-answer tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// School named in the profile answer
    pub school_name: String,
    /// Phrases asking about the student themself
    #[serde(default)]
    pub personal_triggers: Vec<String>,
    /// Phrases asking for the list of enrolled courses
    #[serde(default)]
    pub course_list_triggers: Vec<String>,
    /// Per-course tables
    #[serde(default)]
    pub courses: Vec<CourseTable>,
    /// Non-subject questions
    #[serde(default)]
    pub general: Vec<KnowledgeEntry>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::from_yaml(DEFAULT_KNOWLEDGE_YAML).expect("embedded knowledge tables parse")
    }
}

impl KnowledgeBase {
    /// Parse tables from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, KnowledgeError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load tables from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check the tables are usable. Any failure here is a startup error.
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        let mut ids = HashSet::new();
        for course in &self.courses {
            if course.id.trim().is_empty() {
                return Err(KnowledgeError::Invalid("course with empty id".to_string()));
            }
            if !ids.insert(course.id.as_str()) {
                return Err(KnowledgeError::Invalid(format!(
                    "duplicate course id '{}'",
                    course.id
                )));
            }
            validate_entries(&course.entries, &course.id)?;
        }
        validate_entries(&self.general, "general")?;

        for trigger in self.personal_triggers.iter().chain(&self.course_list_triggers) {
            if trigger.trim().is_empty() {
                return Err(KnowledgeError::Invalid("empty trigger phrase".to_string()));
            }
        }

        Ok(())
    }

    /// Find a course table by id.
    pub fn course(&self, id: &str) -> Option<&CourseTable> {
        self.courses.iter().find(|c| c.id == id)
    }

    /// Look up a static answer.
    ///
    /// Order: personal intent, enrolled courses, general FAQ, course list.
    /// Returns `None` when nothing matches.
    pub fn lookup(
        &self,
        text: &str,
        enrolled_topic_ids: &[String],
        display_name: Option<&str>,
    ) -> Option<KnowledgeAnswer> {
        let lowered = text.to_lowercase();

        if contains_any(&lowered, &self.personal_triggers) {
            return Some(KnowledgeAnswer {
                text: self.profile_answer(enrolled_topic_ids, display_name),
                source: KnowledgeSource::StudentProfile,
            });
        }

        for course in enrolled_topic_ids.iter().filter_map(|id| self.course(id)) {
            if let Some(entry) = first_match(&lowered, &course.entries) {
                return Some(KnowledgeAnswer {
                    text: entry.answer.clone(),
                    source: KnowledgeSource::Course {
                        id: course.id.clone(),
                    },
                });
            }
        }

        if let Some(entry) = first_match(&lowered, &self.general) {
            return Some(KnowledgeAnswer {
                text: entry.answer.clone(),
                source: KnowledgeSource::GeneralFaq,
            });
        }

        if contains_any(&lowered, &self.course_list_triggers) {
            return Some(KnowledgeAnswer {
                text: self.course_list_answer(enrolled_topic_ids),
                source: KnowledgeSource::CourseList,
            });
        }

        None
    }

    fn enrolled_course_names(&self, enrolled_topic_ids: &[String]) -> Vec<String> {
        enrolled_topic_ids
            .iter()
            .map(|id| {
                self.course(id)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| id.clone())
            })
            .collect()
    }

    fn profile_answer(&self, enrolled_topic_ids: &[String], display_name: Option<&str>) -> String {
        let full_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("student");
        let first_name = full_name.split_whitespace().next().unwrap_or(full_name);

        let courses = self.enrolled_course_names(enrolled_topic_ids);
        let enrollment = if courses.is_empty() {
            "You aren't enrolled in any courses yet.".to_string()
        } else {
            format!("You're enrolled in: {}.", courses.join(", "))
        };

        format!(
            "Hi {first_name}! Your name is {full_name} and you're a student at {school}. \
             {enrollment} You can find your grade level and school details on your Profile page.",
            school = self.school_name,
        )
    }

    fn course_list_answer(&self, enrolled_topic_ids: &[String]) -> String {
        let courses = self.enrolled_course_names(enrolled_topic_ids);
        if courses.is_empty() {
            return "You aren't enrolled in any courses yet. Ask your teacher to add you to a class."
                .to_string();
        }

        let mut answer = String::from("Here are the courses you're enrolled in:\n");
        for course in courses {
            answer.push_str(&format!("• {}\n", course));
        }
        answer.trim_end().to_string()
    }
}

fn validate_entries(entries: &[KnowledgeEntry], table: &str) -> Result<(), KnowledgeError> {
    for entry in entries {
        if entry.keyword.trim().is_empty() {
            return Err(KnowledgeError::Invalid(format!(
                "empty keyword in table '{}'",
                table
            )));
        }
        if entry.answer.trim().is_empty() {
            return Err(KnowledgeError::Invalid(format!(
                "empty answer for '{}' in table '{}'",
                entry.keyword, table
            )));
        }
    }
    Ok(())
}

fn first_match<'a>(lowered: &str, entries: &'a [KnowledgeEntry]) -> Option<&'a KnowledgeEntry> {
    entries
        .iter()
        .find(|entry| lowered.contains(&entry.keyword.to_lowercase()))
}

/// Whether any trigger phrase appears as whole words.
fn contains_any(lowered: &str, phrases: &[String]) -> bool {
    phrases
        .iter()
        .any(|phrase| contains_phrase(lowered, &phrase.to_lowercase()))
}

fn contains_phrase(lowered: &str, phrase: &str) -> bool {
    lowered.match_indices(phrase).any(|(start, _)| {
        let before = lowered[..start].chars().next_back();
        let after = lowered[start + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
