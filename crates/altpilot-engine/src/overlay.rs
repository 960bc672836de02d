use std::collections::BTreeSet;

use altpilot_contracts::asset::AssetSnapshot;
use altpilot_contracts::config::Configuration;
use altpilot_contracts::dom::{Document, NodeSpec};
use altpilot_contracts::remote::ActionKind;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::resolver::FieldResolver;
use crate::workflow::RenameState;

/// The one element id the singleton invariant hangs on: opening always
/// removes any existing element with this id before inserting a new one.
pub const OVERLAY_ID: &str = "altpilot-overlay";

pub const CLOSE_BUTTON_ID: &str = "altpilot-close";
pub const KEYWORDS_INPUT_ID: &str = "altpilot-keywords";
pub const TITLE_BUTTON_ID: &str = "altpilot-generate-title";
pub const ALT_BUTTON_ID: &str = "altpilot-generate-alt";
pub const BOTH_BUTTON_ID: &str = "altpilot-generate-both";
pub const DUPLICATE_BUTTON_ID: &str = "altpilot-duplicate";
pub const RENAME_BUTTON_ID: &str = "altpilot-rename-file";
pub const TITLE_STATUS_ID: &str = "altpilot-title-status";
pub const ALT_STATUS_ID: &str = "altpilot-alt-status";
pub const BOTH_STATUS_ID: &str = "altpilot-both-status";
pub const DUPLICATE_STATUS_ID: &str = "altpilot-duplicate-status";
pub const RENAME_STATUS_ID: &str = "altpilot-rename-status";
pub const CONFIRM_RENAME_ID: &str = "altpilot-confirm-rename";
pub const CANCEL_RENAME_ID: &str = "altpilot-cancel-rename";

pub const LABEL_GENERATE: &str = "Generate";
pub const LABEL_REGENERATE: &str = "Regenerate";
pub const LABEL_NOT_AVAILABLE: &str = "Not Available";
pub const LABEL_GENERATE_BOTH: &str = "Generate Both";
pub const LABEL_CREATE_COPY: &str = "Create Copy";
pub const LABEL_GENERATE_FILENAME: &str = "Generate Filename";

/// What a click on an overlay control means. Built once per open; the rename
/// confirm/cancel pair is added while a proposal is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Trigger(ActionKind),
    ConfirmRename,
    CancelRename,
    Dismiss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Other,
}

/// The single active overlay: its asset, the configuration snapshot taken at
/// open, the control subscription table, and per-kind pending state.
pub struct OverlaySession {
    id: Uuid,
    asset: AssetSnapshot,
    config: Configuration,
    handlers: IndexMap<String, ControlAction>,
    pending: BTreeSet<ActionKind>,
    pub(crate) rename: RenameState,
    escape_registered: bool,
}

impl OverlaySession {
    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn asset(&self) -> &AssetSnapshot {
        &self.asset
    }

    pub fn config(&self) -> Configuration {
        self.config
    }

    pub fn rename_state(&self) -> &RenameState {
        &self.rename
    }

    pub fn handler(&self, element_id: &str) -> Option<ControlAction> {
        self.handlers.get(element_id).copied()
    }

    pub fn escape_registered(&self) -> bool {
        self.escape_registered
    }

    pub fn is_pending(&self, kind: ActionKind) -> bool {
        self.pending.contains(&kind)
    }

    /// Claims the per-kind pending slot; false means a remote operation of
    /// this kind is already in flight and the click must be dropped.
    pub(crate) fn begin(&mut self, kind: ActionKind) -> bool {
        self.pending.insert(kind)
    }

    pub(crate) fn finish(&mut self, kind: ActionKind) {
        self.pending.remove(&kind);
    }

    pub(crate) fn register(&mut self, element_id: &str, action: ControlAction) {
        self.handlers.insert(element_id.to_string(), action);
    }

    pub(crate) fn deregister(&mut self, element_id: &str) {
        self.handlers.shift_remove(element_id);
    }
}

/// Owns the overlay lifecycle. Nothing else creates or destroys the overlay
/// element; other components only read from or write within it.
pub struct OverlayController {
    resolver: FieldResolver,
}

impl OverlayController {
    pub fn new(resolver: FieldResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    pub fn open(&self, doc: &mut Document, asset_id: &str, config: Configuration) -> OverlaySession {
        if let Some(existing) = doc.find_by_element_id(OVERLAY_ID) {
            doc.remove(existing);
        }

        let asset = self.resolver.snapshot(doc, asset_id);
        let gates = Gates::compute(&asset, config);
        let spec = build_overlay(&asset, gates);
        let root = doc.root();
        doc.insert(root, spec);

        if let Some(keywords) = doc.find_by_element_id(KEYWORDS_INPUT_ID) {
            doc.focus(keywords);
        }

        let mut session = OverlaySession {
            id: Uuid::new_v4(),
            asset,
            config,
            handlers: IndexMap::new(),
            pending: BTreeSet::new(),
            rename: RenameState::Idle,
            escape_registered: true,
        };
        session.register(CLOSE_BUTTON_ID, ControlAction::Dismiss);
        session.register(TITLE_BUTTON_ID, ControlAction::Trigger(ActionKind::Title));
        session.register(ALT_BUTTON_ID, ControlAction::Trigger(ActionKind::Alt));
        if gates.show_both {
            session.register(BOTH_BUTTON_ID, ControlAction::Trigger(ActionKind::Both));
        }
        session.register(
            DUPLICATE_BUTTON_ID,
            ControlAction::Trigger(ActionKind::Duplicate),
        );
        if gates.show_advanced {
            session.register(RENAME_BUTTON_ID, ControlAction::Trigger(ActionKind::Rename));
        }
        session
    }

    /// Removes the overlay element and detaches the session's listeners. The
    /// element may already be gone (replaced by a newer open); that is fine.
    pub fn close(&self, doc: &mut Document, session: &mut OverlaySession) {
        if let Some(existing) = doc.find_by_element_id(OVERLAY_ID) {
            doc.remove(existing);
        }
        session.handlers.clear();
        session.escape_registered = false;
    }
}

/// All gating booleans, computed once up front so each fragment's condition
/// is testable in isolation.
#[derive(Debug, Clone, Copy)]
struct Gates {
    is_vector: bool,
    show_keywords: bool,
    show_both: bool,
    show_advanced: bool,
}

impl Gates {
    fn compute(asset: &AssetSnapshot, config: Configuration) -> Self {
        let is_vector = asset.is_vector();
        Self {
            is_vector,
            show_keywords: config.show_keywords && !is_vector,
            show_both: config.auto_generate_both_enabled
                && !is_vector
                && asset.missing_title()
                && asset.missing_alt(),
            show_advanced: config.dangerous_rename_enabled,
        }
    }
}

fn build_overlay(asset: &AssetSnapshot, gates: Gates) -> NodeSpec {
    let mut content = NodeSpec::new("div")
        .class("altpilot-content")
        .child(header_fragment())
        .child(preview_fragment(asset));
    if gates.is_vector {
        content = content.child(vector_warning_fragment());
    }
    if gates.show_keywords {
        content = content.child(keywords_fragment());
    }
    if gates.show_both {
        content = content.child(both_fragment());
    }
    content = content.child(actions_fragment(asset, gates.is_vector));
    if gates.show_advanced {
        content = content.child(advanced_fragment());
    }

    NodeSpec::new("div")
        .id(OVERLAY_ID)
        .class("altpilot-backdrop")
        .child(content)
}

fn header_fragment() -> NodeSpec {
    NodeSpec::new("div")
        .class("altpilot-header")
        .child(NodeSpec::new("h2").text("AI Tools & Metadata"))
        .child(NodeSpec::new("button").id(CLOSE_BUTTON_ID).text("Close"))
}

fn preview_fragment(asset: &AssetSnapshot) -> NodeSpec {
    let mut preview = NodeSpec::new("div").class("altpilot-preview");
    if asset.preview_url.is_empty() {
        preview = preview.child(
            NodeSpec::new("div")
                .class("altpilot-preview-missing")
                .text("Image preview not available"),
        );
    } else {
        preview = preview.child(
            NodeSpec::new("img")
                .attr("src", asset.preview_url.clone())
                .attr("alt", "Preview"),
        );
    }
    preview
        .child(NodeSpec::new("div").class("altpilot-meta").text(format!(
            "Asset ID: {} | Current title: {} | Current alt text: {}",
            asset.id,
            if asset.missing_title() { "(none)" } else { asset.title.as_str() },
            if asset.missing_alt() { "(none)" } else { asset.alt_text.as_str() },
        )))
}

fn vector_warning_fragment() -> NodeSpec {
    NodeSpec::new("div")
        .class("altpilot-vector-warning")
        .text(
            "Vector file detected. AI vision models only analyze raster images; \
             add metadata manually or convert to PNG/JPG for AI processing.",
        )
}

fn keywords_fragment() -> NodeSpec {
    NodeSpec::new("div")
        .class("altpilot-keywords")
        .child(NodeSpec::new("label").text("Keywords (optional):"))
        .child(
            NodeSpec::new("input")
                .id(KEYWORDS_INPUT_ID)
                .attr("placeholder", "e.g., business person, outdoor scene, product photo"),
        )
}

fn both_fragment() -> NodeSpec {
    NodeSpec::new("div")
        .class("altpilot-both-card")
        .child(
            NodeSpec::new("button")
                .id(BOTH_BUTTON_ID)
                .text(LABEL_GENERATE_BOTH),
        )
        .child(NodeSpec::new("span").text("Title + Alt Text"))
        .child(status_slot(BOTH_STATUS_ID))
}

fn actions_fragment(asset: &AssetSnapshot, is_vector: bool) -> NodeSpec {
    let title_label = card_label(is_vector, asset.missing_title());
    let alt_label = card_label(is_vector, asset.missing_alt());
    NodeSpec::new("div")
        .class("altpilot-actions")
        .child(action_card(
            "Title",
            TITLE_BUTTON_ID,
            TITLE_STATUS_ID,
            title_label,
            is_vector,
        ))
        .child(action_card(
            "Alt Text",
            ALT_BUTTON_ID,
            ALT_STATUS_ID,
            alt_label,
            is_vector,
        ))
        .child(action_card(
            "Duplicate",
            DUPLICATE_BUTTON_ID,
            DUPLICATE_STATUS_ID,
            LABEL_CREATE_COPY,
            false,
        ))
}

fn card_label(is_vector: bool, missing: bool) -> &'static str {
    if is_vector {
        LABEL_NOT_AVAILABLE
    } else if missing {
        LABEL_GENERATE
    } else {
        LABEL_REGENERATE
    }
}

fn action_card(
    heading: &str,
    button_id: &str,
    status_id: &str,
    label: &str,
    disabled: bool,
) -> NodeSpec {
    let mut button = NodeSpec::new("button").id(button_id).text(label);
    if disabled {
        button = button.attr("disabled", "disabled");
    }
    NodeSpec::new("div")
        .class("altpilot-card")
        .child(NodeSpec::new("span").text(heading))
        .child(button)
        .child(status_slot(status_id))
}

fn advanced_fragment() -> NodeSpec {
    NodeSpec::new("div")
        .class("altpilot-advanced")
        .child(NodeSpec::new("span").text("Advanced - use with caution"))
        .child(
            NodeSpec::new("button")
                .id(RENAME_BUTTON_ID)
                .text(LABEL_GENERATE_FILENAME),
        )
        .child(status_slot(RENAME_STATUS_ID))
}

fn status_slot(status_id: &str) -> NodeSpec {
    NodeSpec::new("div")
        .id(status_id)
        .class("altpilot-status")
        .attr("data-visible", "false")
}
