//! Non-fatal notices collected while a model is assembled.
//!
//! Anything the builder repairs or defaults on its own (asymmetric line data,
//! absent optional columns, ignored settings) is recorded here instead of
//! failing the build, and is also emitted through `tracing`.
//!
//! ```
//! use dopt_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_notice("defaults", "grid_available missing from input, using 1");
//! diag.add_warning_with_entity("symmetry", "power_capacity differs", "N1-N2");
//!
//! assert_eq!(diag.count(Severity::Warning), 1);
//! assert!(diag.has_category("symmetry"));
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A neutral default was applied
    Notice,
    /// Input was inconsistent and has been repaired
    Warning,
    /// Input was unusable; the model was not built
    Error,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping key such as "symmetry", "defaults" or "network"
    pub category: String,
    pub message: String,
    /// Asset, node or line the issue refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}] {}",
            self.severity.as_str(),
            self.category,
            self.message
        )?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Ordered collection of issues for one build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    // =========================================================================
    // Recording
    // =========================================================================

    pub fn add_notice(&mut self, category: &str, message: &str) {
        tracing::info!(category, "{}", message);
        self.add(DiagnosticIssue::new(Severity::Notice, category, message));
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        tracing::warn!(category, "{}", message);
        self.add(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        tracing::warn!(category, entity, "{}", message);
        self.add(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        tracing::error!(category, entity, "{}", message);
        self.add(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.issues.iter().any(|i| i.category == category)
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        let notices = self.count(Severity::Notice);
        let warnings = self.count(Severity::Warning);
        let errors = self.count(Severity::Error);
        if notices + warnings + errors == 0 {
            return "No issues".to_string();
        }
        format!(
            "{} notice{}, {} warning{}, {} error{}",
            notices,
            plural(notices),
            warnings,
            plural(warnings),
            errors,
            plural(errors)
        )
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_entity() {
        let issue = DiagnosticIssue::new(Severity::Warning, "symmetry", "line_len differs")
            .with_entity("N1-N2");
        assert_eq!(issue.to_string(), "[warning:symmetry] line_len differs (N1-N2)");
    }

    #[test]
    fn test_summary_counts() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");
        diag.add_notice("defaults", "fuel_available defaulted");
        diag.add_warning("symmetry", "a");
        diag.add_warning("symmetry", "b");
        assert_eq!(diag.summary(), "1 notice, 2 warnings, 0 errors");
        assert_eq!(diag.issues_by_category("symmetry").count(), 2);
        assert!(!diag.has_errors());
    }

    #[test]
    fn test_merge() {
        let mut a = Diagnostics::new();
        a.add_notice("defaults", "x");
        let mut b = Diagnostics::new();
        b.add_error_with_entity("network", "no slack", "N1");
        a.merge(b);
        assert_eq!(a.issues.len(), 2);
        assert!(a.has_errors());
    }
}
