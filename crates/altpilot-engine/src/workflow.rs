use altpilot_contracts::dom::{Document, Node, NodeSpec};
use altpilot_contracts::remote::{ActionKind, MetadataField, RemoteError, UsageReport};

use crate::overlay::{
    ControlAction, ALT_BUTTON_ID, ALT_STATUS_ID, BOTH_BUTTON_ID, BOTH_STATUS_ID,
    CANCEL_RENAME_ID, CONFIRM_RENAME_ID, DUPLICATE_BUTTON_ID, DUPLICATE_STATUS_ID,
    KEYWORDS_INPUT_ID, LABEL_CREATE_COPY, LABEL_GENERATE_BOTH, LABEL_GENERATE_FILENAME,
    LABEL_REGENERATE, RENAME_BUTTON_ID, RENAME_STATUS_ID, TITLE_BUTTON_ID, TITLE_STATUS_ID,
};
use crate::resolver;
use crate::status::Severity;
use crate::OverlayEngine;

const BUSY_GENERATING: &str = "Generating...";
const BUSY_DUPLICATING: &str = "Duplicating...";

/// Where the rename flow stands. The flow is the only multi-step workflow;
/// every state transition happens on a user decision or a service response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameState {
    Idle,
    /// A generated filename is on screen awaiting confirm or cancel.
    Proposed { candidate: String },
    /// The usage scan found live references; renaming now requires an
    /// explicit override.
    BlockedOnWarning {
        candidate: String,
        report: UsageReport,
    },
    Done { new_filename: String },
    Cancelled,
}

impl OverlayEngine {
    /// Entry point for the overlay's action buttons. Clicks while an
    /// operation of the same kind is in flight are dropped.
    pub fn trigger(&mut self, doc: &mut Document, kind: ActionKind) {
        match kind {
            ActionKind::Title => self.generate_single(doc, MetadataField::Title),
            ActionKind::Alt => self.generate_single(doc, MetadataField::Alt),
            ActionKind::Both => self.generate_both(doc),
            ActionKind::Duplicate => self.duplicate(doc),
            ActionKind::Rename => self.start_rename(doc),
        }
    }

    fn generate_single(&mut self, doc: &mut Document, field: MetadataField) {
        let kind = match field {
            MetadataField::Title => ActionKind::Title,
            MetadataField::Alt => ActionKind::Alt,
        };
        let Some(asset_id) = self.claim(kind, true) else {
            return;
        };
        let (button_id, status_id) = match field {
            MetadataField::Title => (TITLE_BUTTON_ID, TITLE_STATUS_ID),
            MetadataField::Alt => (ALT_BUTTON_ID, ALT_STATUS_ID),
        };

        let keywords = keywords_value(doc);
        let prior_label = button_label(doc, button_id);
        set_button_busy(doc, button_id, BUSY_GENERATING);
        self.reporter.report(
            doc,
            status_id,
            &format!("Generating {}...", field.display_name().to_lowercase()),
            Severity::Info,
        );

        let outcome = self.service.generate_metadata(field, &asset_id, &keywords);
        self.release(kind);
        match outcome {
            Ok(value) => {
                reflect_field(doc, field, &asset_id, &value);
                restore_button(doc, button_id, LABEL_REGENERATE);
                self.reporter.report(
                    doc,
                    status_id,
                    &format!("{} generated successfully!", field.display_name()),
                    Severity::Success,
                );
                self.emit(
                    "action_succeeded",
                    &[("asset", &asset_id), ("action", kind.label())],
                );
            }
            Err(err) => {
                restore_button(doc, button_id, &prior_label);
                self.reporter
                    .report(doc, status_id, &format!("Error: {err}"), Severity::Error);
                self.emit_failure(&asset_id, kind, &err);
            }
        }
    }

    fn generate_both(&mut self, doc: &mut Document) {
        let Some(asset_id) = self.claim(ActionKind::Both, true) else {
            return;
        };
        let keywords = keywords_value(doc);
        set_button_busy(doc, BOTH_BUTTON_ID, BUSY_GENERATING);
        self.reporter.report(
            doc,
            BOTH_STATUS_ID,
            "Generating title and alt text...",
            Severity::Info,
        );

        let outcome = self.service.generate_both(&asset_id, &keywords);
        self.release(ActionKind::Both);
        match outcome {
            Ok(both) => {
                reflect_field(doc, MetadataField::Title, &asset_id, &both.title);
                reflect_field(doc, MetadataField::Alt, &asset_id, &both.alt);
                restore_button(doc, BOTH_BUTTON_ID, LABEL_GENERATE_BOTH);
                restore_button(doc, TITLE_BUTTON_ID, LABEL_REGENERATE);
                restore_button(doc, ALT_BUTTON_ID, LABEL_REGENERATE);
                self.reporter.report(
                    doc,
                    BOTH_STATUS_ID,
                    "Title and alt text generated successfully!",
                    Severity::Success,
                );
                self.emit(
                    "action_succeeded",
                    &[("asset", &asset_id), ("action", ActionKind::Both.label())],
                );
            }
            Err(err) => {
                restore_button(doc, BOTH_BUTTON_ID, LABEL_GENERATE_BOTH);
                self.reporter.report(
                    doc,
                    BOTH_STATUS_ID,
                    &format!("Error: {err}"),
                    Severity::Error,
                );
                self.emit_failure(&asset_id, ActionKind::Both, &err);
            }
        }
    }

    fn duplicate(&mut self, doc: &mut Document) {
        // Duplication works for vectors too; only vision calls are gated.
        let Some(asset_id) = self.claim(ActionKind::Duplicate, false) else {
            return;
        };
        let keywords = keywords_value(doc);
        set_button_busy(doc, DUPLICATE_BUTTON_ID, BUSY_DUPLICATING);
        self.reporter.report(
            doc,
            DUPLICATE_STATUS_ID,
            "Creating duplicate...",
            Severity::Info,
        );

        let outcome = self.service.duplicate(&asset_id, &keywords);
        self.release(ActionKind::Duplicate);
        match outcome {
            Ok(new_id) => {
                restore_button(doc, DUPLICATE_BUTTON_ID, LABEL_CREATE_COPY);
                self.reporter.report(
                    doc,
                    DUPLICATE_STATUS_ID,
                    &format!("Duplicate created! New asset ID: {new_id}. "),
                    Severity::Success,
                );
                // Follow-up link to the copy in the host's library view.
                if let Some(status) = doc.find_by_element_id(DUPLICATE_STATUS_ID) {
                    doc.insert(
                        status,
                        NodeSpec::new("a")
                            .attr("href", format!("upload.php?item={new_id}"))
                            .text("View in library"),
                    );
                }
                self.emit(
                    "action_succeeded",
                    &[
                        ("asset", &asset_id),
                        ("action", ActionKind::Duplicate.label()),
                        ("copy", &new_id),
                    ],
                );
            }
            Err(err) => {
                restore_button(doc, DUPLICATE_BUTTON_ID, LABEL_CREATE_COPY);
                self.reporter.report(
                    doc,
                    DUPLICATE_STATUS_ID,
                    &format!("Error: {err}"),
                    Severity::Error,
                );
                self.emit_failure(&asset_id, ActionKind::Duplicate, &err);
            }
        }
    }

    /// First stage of the rename flow: ask the service for a filename and
    /// put it on screen as a proposal. Nothing is renamed yet.
    fn start_rename(&mut self, doc: &mut Document) {
        let Some(asset_id) = self.claim(ActionKind::Rename, false) else {
            return;
        };
        let keywords = keywords_value(doc);
        set_button_busy(doc, RENAME_BUTTON_ID, BUSY_GENERATING);
        self.reporter.report(
            doc,
            RENAME_STATUS_ID,
            "Generating filename...",
            Severity::Info,
        );

        let outcome = self.service.generate_filename(&asset_id, &keywords);
        restore_button(doc, RENAME_BUTTON_ID, LABEL_GENERATE_FILENAME);
        match outcome {
            Ok(candidate) => {
                if let Some(session) = self.session.as_mut() {
                    session.rename = RenameState::Proposed {
                        candidate: candidate.clone(),
                    };
                }
                self.reporter.report(
                    doc,
                    RENAME_STATUS_ID,
                    &format!("Suggested filename: {candidate}"),
                    Severity::Info,
                );
                self.render_rename_controls(doc, "Rename");
            }
            Err(err) => {
                self.release(ActionKind::Rename);
                self.reporter.report(
                    doc,
                    RENAME_STATUS_ID,
                    &format!("Error: {err}"),
                    Severity::Error,
                );
                self.emit_failure(&asset_id, ActionKind::Rename, &err);
            }
        }
    }

    /// The user accepted the proposal. Scans usage first; a clean report
    /// executes immediately, live references block on a warning.
    pub fn confirm_rename(&mut self, doc: &mut Document) {
        let candidate = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            match session.rename_state() {
                RenameState::Proposed { candidate } => candidate.clone(),
                _ => return,
            }
        };
        let Some(asset_id) = self.asset_id() else {
            return;
        };

        self.remove_rename_controls();
        self.reporter
            .report(doc, RENAME_STATUS_ID, "Checking usage...", Severity::Info);

        match self.service.check_usage(&asset_id) {
            Ok(report) if report.is_safe_to_rename => {
                self.execute_rename(doc, &candidate, false);
            }
            Ok(report) => {
                let mut message = format!(
                    "Warning: this file is referenced in {} place(s):",
                    report.usage_count
                );
                for line in report.reference_lines() {
                    message.push('\n');
                    message.push_str(&line);
                }
                message.push_str("\nRenaming may break these references.");
                let count = report.usage_count.to_string();
                if let Some(session) = self.session.as_mut() {
                    session.rename = RenameState::BlockedOnWarning { candidate, report };
                }
                self.reporter
                    .report(doc, RENAME_STATUS_ID, &message, Severity::Info);
                self.render_rename_controls(doc, "Rename Anyway");
                self.emit(
                    "rename_blocked",
                    &[("asset", &asset_id), ("references", &count)],
                );
            }
            Err(err) => {
                if let Some(session) = self.session.as_mut() {
                    session.rename = RenameState::Idle;
                }
                self.release(ActionKind::Rename);
                self.reporter.report(
                    doc,
                    RENAME_STATUS_ID,
                    &format!("Error: {err}"),
                    Severity::Error,
                );
                self.emit_failure(&asset_id, ActionKind::Rename, &err);
            }
        }
    }

    /// The user overrode the usage warning. The override rides along on the
    /// wire so the service skips its own safety check.
    pub fn force_rename(&mut self, doc: &mut Document) {
        let candidate = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            match session.rename_state() {
                RenameState::BlockedOnWarning { candidate, .. } => candidate.clone(),
                _ => return,
            }
        };
        self.remove_rename_controls();
        self.execute_rename(doc, &candidate, true);
    }

    pub fn cancel_rename(&mut self, doc: &mut Document) {
        let candidate = {
            let Some(session) = self.session.as_ref() else {
                return;
            };
            match session.rename_state() {
                RenameState::Proposed { candidate }
                | RenameState::BlockedOnWarning { candidate, .. } => candidate.clone(),
                _ => return,
            }
        };
        if let Some(session) = self.session.as_mut() {
            session.rename = RenameState::Cancelled;
        }
        self.remove_rename_controls();
        self.release(ActionKind::Rename);
        // The suggestion stays visible so the user can still act on it by
        // hand; nothing was renamed.
        self.reporter.report(
            doc,
            RENAME_STATUS_ID,
            &format!("Rename cancelled. Suggested filename was: {candidate}"),
            Severity::Info,
        );
    }

    fn execute_rename(&mut self, doc: &mut Document, candidate: &str, force: bool) {
        let Some(asset_id) = self.asset_id() else {
            return;
        };
        self.reporter
            .report(doc, RENAME_STATUS_ID, "Renaming file...", Severity::Info);

        match self.service.rename(&asset_id, candidate, force) {
            Ok(new_filename) => {
                if let Some(session) = self.session.as_mut() {
                    session.rename = RenameState::Done {
                        new_filename: new_filename.clone(),
                    };
                }
                self.release(ActionKind::Rename);
                self.reporter.report(
                    doc,
                    RENAME_STATUS_ID,
                    &format!(
                        "File renamed to {new_filename}. Existing references to the \
                         old filename are not updated automatically."
                    ),
                    Severity::Info,
                );
                self.emit(
                    "action_succeeded",
                    &[
                        ("asset", &asset_id),
                        ("action", ActionKind::Rename.label()),
                        ("filename", &new_filename),
                        ("forced", if force { "true" } else { "false" }),
                    ],
                );
            }
            Err(err) => {
                if let Some(session) = self.session.as_mut() {
                    session.rename = RenameState::Idle;
                }
                self.release(ActionKind::Rename);
                self.reporter.report(
                    doc,
                    RENAME_STATUS_ID,
                    &format!("Error: {err}"),
                    Severity::Error,
                );
                self.emit_failure(&asset_id, ActionKind::Rename, &err);
            }
        }
    }

    /// Claims the per-kind pending slot and hands back the asset id, or
    /// nothing when there is no session, the slot is taken, or the asset is
    /// a vector and the action needs vision.
    fn claim(&mut self, kind: ActionKind, vision: bool) -> Option<String> {
        let asset_id = {
            let session = self.session.as_ref()?;
            if vision && session.asset().is_vector() {
                return None;
            }
            session.asset().id.clone()
        };
        if !self.session.as_mut()?.begin(kind) {
            return None;
        }
        self.emit(
            "action_started",
            &[("asset", &asset_id), ("action", kind.label())],
        );
        Some(asset_id)
    }

    fn emit_failure(&self, asset_id: &str, kind: ActionKind, err: &RemoteError) {
        self.emit(
            "action_failed",
            &[
                ("asset", asset_id),
                ("action", kind.label()),
                ("error", &err.to_string()),
            ],
        );
    }

    fn release(&mut self, kind: ActionKind) {
        if let Some(session) = self.session.as_mut() {
            session.finish(kind);
        }
    }

    fn asset_id(&self) -> Option<String> {
        self.session.as_ref().map(|session| session.asset().id.clone())
    }

    /// Appends confirm and cancel controls to the rename status element and
    /// subscribes them. The next status report clears the elements; the
    /// subscriptions are removed explicitly at each decision point.
    fn render_rename_controls(&mut self, doc: &mut Document, confirm_label: &str) {
        let Some(status) = doc.find_by_element_id(RENAME_STATUS_ID) else {
            return;
        };
        doc.insert(
            status,
            NodeSpec::new("button").id(CONFIRM_RENAME_ID).text(confirm_label),
        );
        doc.insert(
            status,
            NodeSpec::new("button").id(CANCEL_RENAME_ID).text("Cancel"),
        );
        if let Some(session) = self.session.as_mut() {
            session.register(CONFIRM_RENAME_ID, ControlAction::ConfirmRename);
            session.register(CANCEL_RENAME_ID, ControlAction::CancelRename);
        }
    }

    fn remove_rename_controls(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.deregister(CONFIRM_RENAME_ID);
            session.deregister(CANCEL_RENAME_ID);
        }
    }
}

fn keywords_value(doc: &Document) -> String {
    doc.find_by_element_id(KEYWORDS_INPUT_ID)
        .and_then(|id| doc.get(id))
        .and_then(Node::value)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn button_label(doc: &Document, button_id: &str) -> String {
    doc.find_by_element_id(button_id)
        .and_then(|id| doc.get(id))
        .map(|node| node.text().to_string())
        .unwrap_or_default()
}

fn set_button_busy(doc: &mut Document, button_id: &str, label: &str) {
    if let Some(id) = doc.find_by_element_id(button_id) {
        doc.set_text(id, label);
        doc.set_attr(id, "disabled", "disabled");
    }
}

fn restore_button(doc: &mut Document, button_id: &str, label: &str) {
    if let Some(id) = doc.find_by_element_id(button_id) {
        doc.set_text(id, label);
        doc.remove_attr(id, "disabled");
    }
}

/// Writes a generated value back into the host's field and fires the change
/// notification the host listens for. A missing field means the host moved
/// on; the value is dropped silently.
fn reflect_field(doc: &mut Document, field: MetadataField, asset_id: &str, value: &str) {
    let Some(target) = resolver::field_target(doc, field, asset_id) else {
        return;
    };
    doc.set_value(target, value);
    doc.dispatch_change(target);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use altpilot_contracts::config::Configuration;
    use altpilot_contracts::remote::{BothResult, RemoteError, UsageRef};

    use super::*;
    use crate::overlay::OVERLAY_ID;
    use crate::service::ScriptedService;

    fn raster_doc(asset_id: &str) -> Document {
        Document::from_snapshot(&[
            NodeSpec::new("input").id(format!("attachment_{asset_id}_title")),
            NodeSpec::new("input").id(format!("attachment_{asset_id}_alt")),
        ])
    }

    fn vector_doc(asset_id: &str) -> Document {
        Document::from_snapshot(&[
            NodeSpec::new("div")
                .class("attachment-preview")
                .child(NodeSpec::new("img").attr("src", "/uploads/logo.svg")),
            NodeSpec::new("input").id(format!("attachment_{asset_id}_title")),
        ])
    }

    fn engine_with(
        service: &Arc<ScriptedService>,
        config: Configuration,
    ) -> crate::OverlayEngine {
        crate::OverlayEngine::new(Box::new(Arc::clone(service)), config)
    }

    fn field_value(doc: &Document, element_id: &str) -> String {
        doc.find_by_element_id(element_id)
            .and_then(|id| doc.get(id))
            .and_then(Node::value)
            .unwrap_or_default()
            .to_string()
    }

    fn status_text(doc: &Document, status_id: &str) -> String {
        doc.find_by_element_id(status_id)
            .and_then(|id| doc.get(id))
            .map(|node| node.text().to_string())
            .unwrap_or_default()
    }

    fn click_by_id(engine: &mut crate::OverlayEngine, doc: &mut Document, element_id: &str) {
        let node = doc.find_by_element_id(element_id).expect("control present");
        engine.click(doc, node);
    }

    #[test]
    fn generating_both_fills_both_fields_and_relabels() {
        let service = Arc::new(ScriptedService::new());
        service.script_both(Ok(BothResult {
            title: "Storefront at dusk".to_string(),
            alt: "A storefront illuminated at dusk".to_string(),
        }));
        let mut engine = engine_with(
            &service,
            Configuration {
                auto_generate_both_enabled: true,
                ..Configuration::default()
            },
        );
        let mut doc = raster_doc("42");
        engine.open_overlay(&mut doc, "42");
        doc.take_change_events();

        click_by_id(&mut engine, &mut doc, BOTH_BUTTON_ID);

        assert_eq!(field_value(&doc, "attachment_42_title"), "Storefront at dusk");
        assert_eq!(
            field_value(&doc, "attachment_42_alt"),
            "A storefront illuminated at dusk"
        );
        assert_eq!(doc.take_change_events().len(), 2);
        assert_eq!(
            status_text(&doc, BOTH_STATUS_ID),
            "Title and alt text generated successfully!"
        );
        assert_eq!(button_label(&doc, TITLE_BUTTON_ID), LABEL_REGENERATE);
        assert_eq!(button_label(&doc, ALT_BUTTON_ID), LABEL_REGENERATE);
        assert_eq!(service.calls_for("generate_both"), 1);
    }

    #[test]
    fn half_empty_both_payload_surfaces_as_error_and_touches_nothing() {
        let service = Arc::new(ScriptedService::new());
        service.script_both(Err(RemoteError::InvalidPayload));
        let mut engine = engine_with(
            &service,
            Configuration {
                auto_generate_both_enabled: true,
                ..Configuration::default()
            },
        );
        let mut doc = raster_doc("42");
        engine.open_overlay(&mut doc, "42");
        doc.take_change_events();

        click_by_id(&mut engine, &mut doc, BOTH_BUTTON_ID);

        assert_eq!(field_value(&doc, "attachment_42_title"), "");
        assert_eq!(field_value(&doc, "attachment_42_alt"), "");
        assert!(doc.take_change_events().is_empty());
        assert!(status_text(&doc, BOTH_STATUS_ID).starts_with("Error:"));
        assert_eq!(button_label(&doc, BOTH_BUTTON_ID), LABEL_GENERATE_BOTH);
    }

    #[test]
    fn vector_assets_never_reach_the_service_for_metadata() {
        let service = Arc::new(ScriptedService::new());
        let mut engine = engine_with(&service, Configuration::default());
        let mut doc = vector_doc("42");
        engine.open_overlay(&mut doc, "42");

        engine.trigger(&mut doc, ActionKind::Title);
        engine.trigger(&mut doc, ActionKind::Alt);
        engine.trigger(&mut doc, ActionKind::Both);

        assert!(service.calls().is_empty());
    }

    #[test]
    fn single_generation_failure_restores_the_label() {
        let service = Arc::new(ScriptedService::new());
        service.script_metadata(Err(RemoteError::Domain("quota exceeded".to_string())));
        let mut engine = engine_with(&service, Configuration::default());
        let mut doc = raster_doc("42");
        engine.open_overlay(&mut doc, "42");
        let label_before = button_label(&doc, TITLE_BUTTON_ID);

        click_by_id(&mut engine, &mut doc, TITLE_BUTTON_ID);

        assert_eq!(button_label(&doc, TITLE_BUTTON_ID), label_before);
        assert_eq!(status_text(&doc, TITLE_STATUS_ID), "Error: quota exceeded");
        assert_eq!(field_value(&doc, "attachment_42_title"), "");
    }

    #[test]
    fn duplicate_reports_the_new_asset_id() {
        let service = Arc::new(ScriptedService::new());
        service.script_duplicate(Ok("1042".to_string()));
        let mut engine = engine_with(&service, Configuration::default());
        let mut doc = raster_doc("42");
        engine.open_overlay(&mut doc, "42");

        click_by_id(&mut engine, &mut doc, DUPLICATE_BUTTON_ID);

        assert!(status_text(&doc, DUPLICATE_STATUS_ID).contains("1042"));
        assert_eq!(button_label(&doc, DUPLICATE_BUTTON_ID), LABEL_CREATE_COPY);
    }

    fn rename_config() -> Configuration {
        Configuration {
            dangerous_rename_enabled: true,
            ..Configuration::default()
        }
    }

    #[test]
    fn clean_usage_renames_without_force() {
        let service = Arc::new(ScriptedService::new());
        service.script_filename(Ok("shopfront.jpg".to_string()));
        let mut engine = engine_with(&service, rename_config());
        let mut doc = raster_doc("42");
        engine.open_overlay(&mut doc, "42");

        click_by_id(&mut engine, &mut doc, RENAME_BUTTON_ID);
        assert!(matches!(
            engine.session().expect("session").rename_state(),
            RenameState::Proposed { candidate } if candidate == "shopfront.jpg"
        ));
        assert!(status_text(&doc, RENAME_STATUS_ID).contains("shopfront.jpg"));

        click_by_id(&mut engine, &mut doc, CONFIRM_RENAME_ID);

        assert_eq!(service.calls_for("check_usage"), 1);
        let rename_calls: Vec<_> = service
            .calls()
            .into_iter()
            .filter(|call| call.call == "rename_file")
            .collect();
        assert_eq!(rename_calls.len(), 1);
        assert!(rename_calls[0]
            .params
            .contains(&("force_rename".to_string(), "false".to_string())));
        assert!(matches!(
            engine.session().expect("session").rename_state(),
            RenameState::Done { new_filename } if new_filename == "shopfront.jpg"
        ));
        assert!(status_text(&doc, RENAME_STATUS_ID).contains("not updated automatically"));
    }

    fn unsafe_report() -> UsageReport {
        UsageReport {
            is_safe_to_rename: false,
            usage_count: 2,
            usage: vec![
                UsageRef {
                    ref_type: "post".to_string(),
                    label: "Summer sale".to_string(),
                },
                UsageRef {
                    ref_type: "page".to_string(),
                    label: "About us".to_string(),
                },
            ],
        }
    }

    #[test]
    fn live_references_block_until_explicitly_overridden() {
        let service = Arc::new(ScriptedService::new());
        service.script_filename(Ok("hero.jpg".to_string()));
        service.script_usage(Ok(unsafe_report()));
        let mut engine = engine_with(&service, rename_config());
        let mut doc = raster_doc("7");
        engine.open_overlay(&mut doc, "7");

        click_by_id(&mut engine, &mut doc, RENAME_BUTTON_ID);
        click_by_id(&mut engine, &mut doc, CONFIRM_RENAME_ID);

        // Blocked: the warning names every reference and nothing is renamed.
        let warning = status_text(&doc, RENAME_STATUS_ID);
        assert!(warning.contains("2 place(s)"));
        assert!(warning.contains("post: Summer sale"));
        assert!(warning.contains("page: About us"));
        assert_eq!(service.calls_for("rename_file"), 0);
        assert!(matches!(
            engine.session().expect("session").rename_state(),
            RenameState::BlockedOnWarning { .. }
        ));

        // Overriding sends the force flag.
        click_by_id(&mut engine, &mut doc, CONFIRM_RENAME_ID);
        let rename_calls: Vec<_> = service
            .calls()
            .into_iter()
            .filter(|call| call.call == "rename_file")
            .collect();
        assert_eq!(rename_calls.len(), 1);
        assert!(rename_calls[0]
            .params
            .contains(&("force_rename".to_string(), "true".to_string())));
        assert!(matches!(
            engine.session().expect("session").rename_state(),
            RenameState::Done { .. }
        ));
    }

    #[test]
    fn declining_the_warning_cancels_without_renaming() {
        let service = Arc::new(ScriptedService::new());
        service.script_filename(Ok("hero.jpg".to_string()));
        service.script_usage(Ok(unsafe_report()));
        let mut engine = engine_with(&service, rename_config());
        let mut doc = raster_doc("7");
        engine.open_overlay(&mut doc, "7");

        click_by_id(&mut engine, &mut doc, RENAME_BUTTON_ID);
        click_by_id(&mut engine, &mut doc, CONFIRM_RENAME_ID);
        click_by_id(&mut engine, &mut doc, CANCEL_RENAME_ID);

        assert_eq!(service.calls_for("rename_file"), 0);
        assert!(matches!(
            engine.session().expect("session").rename_state(),
            RenameState::Cancelled
        ));
        let status = status_text(&doc, RENAME_STATUS_ID);
        assert!(status.starts_with("Rename cancelled"));
        assert!(status.contains("hero.jpg"));
        assert!(engine
            .session()
            .expect("session")
            .handler(CONFIRM_RENAME_ID)
            .is_none());
    }

    #[test]
    fn usage_check_failure_resets_the_flow_for_another_attempt() {
        let service = Arc::new(ScriptedService::new());
        service.script_filename(Ok("hero.jpg".to_string()));
        service.script_usage(Err(RemoteError::Transport("HTTP 502".to_string())));
        let mut engine = engine_with(&service, rename_config());
        let mut doc = raster_doc("42");
        engine.open_overlay(&mut doc, "42");

        click_by_id(&mut engine, &mut doc, RENAME_BUTTON_ID);
        click_by_id(&mut engine, &mut doc, CONFIRM_RENAME_ID);

        assert_eq!(service.calls_for("rename_file"), 0);
        assert!(status_text(&doc, RENAME_STATUS_ID).starts_with("Error:"));
        assert!(matches!(
            engine.session().expect("session").rename_state(),
            RenameState::Idle
        ));

        // The pending slot was released, so a fresh proposal is accepted.
        click_by_id(&mut engine, &mut doc, RENAME_BUTTON_ID);
        assert_eq!(service.calls_for("generate_filename"), 2);
        assert!(matches!(
            engine.session().expect("session").rename_state(),
            RenameState::Proposed { .. }
        ));
    }

    #[test]
    fn rename_button_clicks_are_dropped_while_a_proposal_is_open() {
        let service = Arc::new(ScriptedService::new());
        service.script_filename(Ok("hero.jpg".to_string()));
        let mut engine = engine_with(&service, rename_config());
        let mut doc = raster_doc("42");
        engine.open_overlay(&mut doc, "42");

        click_by_id(&mut engine, &mut doc, RENAME_BUTTON_ID);
        click_by_id(&mut engine, &mut doc, RENAME_BUTTON_ID);

        assert_eq!(service.calls_for("generate_filename"), 1);
    }

    #[test]
    fn overlay_survives_the_whole_rename_flow() {
        let service = Arc::new(ScriptedService::new());
        let mut engine = engine_with(&service, rename_config());
        let mut doc = raster_doc("42");
        engine.open_overlay(&mut doc, "42");

        click_by_id(&mut engine, &mut doc, RENAME_BUTTON_ID);
        click_by_id(&mut engine, &mut doc, CONFIRM_RENAME_ID);

        assert!(doc.find_by_element_id(OVERLAY_ID).is_some());
    }
}
