use std::time::{Duration, Instant};

use altpilot_contracts::dom::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Ephemeral feedback surface tied to a specific status element. Success
/// reports auto-clear after a fixed delay; info and error stick around until
/// replaced. A missing target is tolerated and reported nowhere.
pub struct StatusReporter {
    auto_clear: Duration,
    clears: Vec<(String, Instant)>,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self {
            auto_clear: Duration::from_secs(5),
            clears: Vec::new(),
        }
    }

    pub fn with_auto_clear(auto_clear: Duration) -> Self {
        Self {
            auto_clear,
            clears: Vec::new(),
        }
    }

    pub fn report(
        &mut self,
        doc: &mut Document,
        element_id: &str,
        message: &str,
        severity: Severity,
    ) {
        let Some(node) = doc.find_by_element_id(element_id) else {
            return;
        };
        // Replace the whole content, including any controls a previous
        // report rendered inside the element.
        doc.clear_children(node);
        doc.set_text(node, message);
        doc.set_classes(node, vec![format!("altpilot-status-{}", severity.as_str())]);
        doc.set_attr(node, "data-status", severity.as_str());
        doc.set_attr(node, "data-visible", "true");

        self.clears.retain(|(existing, _)| existing != element_id);
        if severity == Severity::Success {
            self.clears
                .push((element_id.to_string(), Instant::now() + self.auto_clear));
        }
    }

    /// Hides success reports whose clear deadline has passed.
    pub fn tick(&mut self, doc: &mut Document, now: Instant) {
        let mut due = Vec::new();
        self.clears.retain(|(element_id, deadline)| {
            if now >= *deadline {
                due.push(element_id.clone());
                false
            } else {
                true
            }
        });
        for element_id in due {
            if let Some(node) = doc.find_by_element_id(&element_id) {
                doc.set_attr(node, "data-visible", "false");
                doc.set_text(node, "");
            }
        }
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}
