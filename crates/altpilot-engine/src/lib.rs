pub mod discovery;
pub mod overlay;
pub mod resolver;
pub mod service;
pub mod status;
pub mod workflow;

use std::time::Instant;

use altpilot_contracts::config::Configuration;
use altpilot_contracts::dom::{Document, Node, NodeId};
use altpilot_contracts::events::{payload, EventLog};

use discovery::{HostBinding, ModalMonitor, MonitorConfig};
use overlay::{ControlAction, Key, OverlayController, OverlaySession, OVERLAY_ID};
use resolver::FieldResolver;
use service::MetadataService;
use status::StatusReporter;
use workflow::RenameState;

/// Top-level coordinator: owns the remote service, the monitor, the overlay
/// controller, the status reporter and the (at most one) open session, and
/// routes user interaction to the per-action workflows.
pub struct OverlayEngine {
    pub(crate) service: Box<dyn MetadataService>,
    pub(crate) controller: OverlayController,
    pub(crate) monitor: ModalMonitor,
    pub(crate) reporter: StatusReporter,
    pub(crate) settings: Configuration,
    pub(crate) session: Option<OverlaySession>,
    pub(crate) events: Option<EventLog>,
}

impl std::fmt::Debug for OverlayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayEngine").finish_non_exhaustive()
    }
}

impl OverlayEngine {
    pub fn new(service: Box<dyn MetadataService>, settings: Configuration) -> Self {
        Self {
            service,
            controller: OverlayController::new(FieldResolver::new()),
            monitor: ModalMonitor::new(MonitorConfig::default()),
            reporter: StatusReporter::new(),
            settings,
            session: None,
            events: None,
        }
    }

    pub fn with_resolver(mut self, resolver: FieldResolver) -> Self {
        self.controller = OverlayController::new(resolver);
        self
    }

    pub fn with_monitor_config(mut self, config: MonitorConfig) -> Self {
        self.monitor = ModalMonitor::new(config);
        self
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn session(&self) -> Option<&OverlaySession> {
        self.session.as_ref()
    }

    pub fn monitor(&self) -> &ModalMonitor {
        &self.monitor
    }

    /// One bounded-poll attempt against the host document.
    pub fn poll(&mut self, doc: &mut Document) -> Vec<HostBinding> {
        let bindings = self.monitor.poll(doc);
        self.emit_scan(&bindings);
        bindings
    }

    /// Drains host mutations, possibly scheduling a debounced re-scan.
    pub fn observe(&mut self, doc: &mut Document, now: Instant) {
        self.monitor.observe(doc, now);
    }

    /// Fires due timers: the debounced re-scan and status auto-clears.
    pub fn tick(&mut self, doc: &mut Document, now: Instant) -> Vec<HostBinding> {
        let bindings = self.monitor.tick(doc, now);
        self.emit_scan(&bindings);
        self.reporter.tick(doc, now);
        bindings
    }

    /// Opens the overlay for `asset_id`, destroying any previous session
    /// unconditionally. Pending operations of the old session are abandoned;
    /// their completions drop on missing elements.
    pub fn open_overlay(&mut self, doc: &mut Document, asset_id: &str) {
        if self.session.is_some() {
            self.close_overlay(doc);
        }
        let session = self.controller.open(doc, asset_id, self.settings);
        self.emit(
            "overlay_opened",
            &[
                ("asset", asset_id),
                ("session_id", &session.session_id().to_string()),
            ],
        );
        self.session = Some(session);
    }

    pub fn close_overlay(&mut self, doc: &mut Document) {
        if let Some(mut session) = self.session.take() {
            self.controller.close(doc, &mut session);
            self.emit("overlay_closed", &[("asset", &session.asset().id)]);
        } else if let Some(existing) = doc.find_by_element_id(OVERLAY_ID) {
            doc.remove(existing);
        }
    }

    /// Routes a click. Launch controls in the host open the overlay; inside
    /// the overlay the subscription table decides; everything else is
    /// ignored. Disabled controls never reach the orchestrator.
    pub fn click(&mut self, doc: &mut Document, target: NodeId) {
        if let Some(asset_id) = discovery::launch_target(doc, target) {
            self.open_overlay(doc, &asset_id);
            return;
        }

        let Some(element_id) = doc
            .get(target)
            .and_then(Node::element_id)
            .map(str::to_string)
        else {
            return;
        };
        if element_id == OVERLAY_ID {
            // A click exactly on the backdrop, not on overlay content.
            self.close_overlay(doc);
            return;
        }
        if doc
            .get(target)
            .and_then(|node| node.attr("disabled"))
            .is_some()
        {
            return;
        }
        let Some(action) = self
            .session
            .as_ref()
            .and_then(|session| session.handler(&element_id))
        else {
            return;
        };
        match action {
            ControlAction::Dismiss => self.close_overlay(doc),
            ControlAction::Trigger(kind) => self.trigger(doc, kind),
            ControlAction::ConfirmRename => {
                let proposed = self.session.as_ref().is_some_and(|session| {
                    matches!(session.rename_state(), RenameState::Proposed { .. })
                });
                let blocked = self.session.as_ref().is_some_and(|session| {
                    matches!(session.rename_state(), RenameState::BlockedOnWarning { .. })
                });
                if proposed {
                    self.confirm_rename(doc);
                } else if blocked {
                    self.force_rename(doc);
                }
            }
            ControlAction::CancelRename => self.cancel_rename(doc),
        }
    }

    /// Escape dismisses the overlay while its key listener is registered;
    /// the listener dies with the session.
    pub fn press_key(&mut self, doc: &mut Document, key: Key) {
        if key != Key::Escape {
            return;
        }
        if self
            .session
            .as_ref()
            .is_some_and(OverlaySession::escape_registered)
        {
            self.close_overlay(doc);
        }
    }

    fn emit_scan(&self, bindings: &[HostBinding]) {
        if bindings.is_empty() {
            return;
        }
        self.emit("scan_matched", &[("regions", &bindings.len().to_string())]);
    }

    pub(crate) fn emit(&self, event: &str, fields: &[(&str, &str)]) {
        if let Some(log) = &self.events {
            // Diagnostics are best-effort: a failed write must never
            // interrupt the interaction it describes.
            let _ = log.emit(event, payload(fields));
        }
    }
}
