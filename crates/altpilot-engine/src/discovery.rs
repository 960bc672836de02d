use std::time::{Duration, Instant};

use altpilot_contracts::dom::{Document, Mutation, NodeId, Selector};

/// Launch controls the host (or our own server-side markup) renders inside
/// its media regions. Discovery binds to these; it never injects buttons of
/// its own.
pub const LAUNCH_CLASS: &str = "altpilot-launch-btn";
pub const ATTACHMENT_ID_ATTR: &str = "data-attachment-id";
const ENHANCED_ATTR: &str = "data-altpilot-enhanced";

/// Structural signatures of media modals across the host implementations we
/// know about. Priority-unordered: every match on every scan is enhanced.
const MODAL_SIGNATURES: &[&str] = &[
    // WordPress native
    ".media-modal-content",
    ".media-frame-content",
    ".attachments-browser",
    // Elementor
    ".elementor-modal-content",
    ".elementor-finder",
    ".dialog-widget-content",
    // Visual Composer
    ".vc_media-xs",
    ".vc_ui-panel-content",
    // Divi
    ".et-fb-modal",
    ".et-core-modal-content",
];

/// Class hints on an inserted subtree root that suggest a modal is being
/// built.
const MODAL_HINT_CLASSES: &[&str] = &["modal", "dialog", "lightbox"];

/// Signatures probed inside an inserted subtree before scheduling a re-scan.
const MODAL_HINT_SIGNATURES: &[&str] =
    &[".media-modal", ".elementor-modal", ".vc_media", ".et-fb-modal"];

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Delay between bounded-poll attempts; the driver sleeps this long.
    pub check_interval: Duration,
    /// Poll attempts before the poller goes inert. Mutation watching is not
    /// bounded.
    pub max_checks: u32,
    /// Settling delay between a modal-like insertion and the re-scan, so the
    /// host can finish building the subtree.
    pub rescan_debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            max_checks: 30,
            rescan_debounce: Duration::from_millis(100),
        }
    }
}

/// A discovered host region and the signature that matched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBinding {
    pub node: NodeId,
    pub strategy: &'static str,
}

/// Watches the host document for media regions, by bounded polling and by
/// mutation observation. Matches are silent no-ops when absent; nothing here
/// ever fails loudly.
pub struct ModalMonitor {
    config: MonitorConfig,
    signatures: Vec<(Selector, &'static str)>,
    hint_signatures: Vec<Selector>,
    checks_done: u32,
    pending_rescan_at: Option<Instant>,
}

impl ModalMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let signatures = MODAL_SIGNATURES
            .iter()
            .filter_map(|text| Selector::parse(text).map(|selector| (selector, *text)))
            .collect();
        let hint_signatures = MODAL_HINT_SIGNATURES
            .iter()
            .filter_map(|text| Selector::parse(text))
            .collect();
        Self {
            config,
            signatures,
            hint_signatures,
            checks_done: 0,
            pending_rescan_at: None,
        }
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    /// One bounded-poll attempt. Inert once the attempt budget is spent.
    pub fn poll(&mut self, doc: &mut Document) -> Vec<HostBinding> {
        if !self.polling_active() {
            return Vec::new();
        }
        self.checks_done += 1;
        self.scan(doc)
    }

    pub fn polling_active(&self) -> bool {
        self.checks_done < self.config.max_checks
    }

    /// Drains the mutation journal; a modal-like insertion schedules one
    /// debounced re-scan rather than one per mutation.
    pub fn observe(&mut self, doc: &mut Document, now: Instant) {
        let mutations = doc.take_mutations();
        let modal_like = mutations.iter().any(|mutation| match mutation {
            Mutation::Inserted(root) => self.looks_modal_like(doc, *root),
            Mutation::Removed(_) => false,
        });
        if modal_like && self.pending_rescan_at.is_none() {
            self.pending_rescan_at = Some(now + self.config.rescan_debounce);
        }
    }

    /// Fires the debounced re-scan once its settling delay has passed.
    pub fn tick(&mut self, doc: &mut Document, now: Instant) -> Vec<HostBinding> {
        match self.pending_rescan_at {
            Some(due) if now >= due => {
                self.pending_rescan_at = None;
                self.scan(doc)
            }
            _ => Vec::new(),
        }
    }

    pub fn rescan_pending(&self) -> bool {
        self.pending_rescan_at.is_some()
    }

    fn scan(&self, doc: &mut Document) -> Vec<HostBinding> {
        let mut bindings = Vec::new();
        for (selector, strategy) in &self.signatures {
            for node in doc.query_all(selector) {
                enhance_region(doc, node);
                bindings.push(HostBinding {
                    node,
                    strategy,
                });
            }
        }
        bindings
    }

    fn looks_modal_like(&self, doc: &Document, root: NodeId) -> bool {
        let Some(node) = doc.get(root) else {
            return false;
        };
        if MODAL_HINT_CLASSES
            .iter()
            .any(|hint| node.has_class(hint))
        {
            return true;
        }
        self.hint_signatures
            .iter()
            .any(|selector| !doc.query_within(root, selector).is_empty())
    }
}

/// Marks every launch control inside `region` as enhanced. Re-marking is a
/// no-op, so overlapping poll and mutation passes stay idempotent.
fn enhance_region(doc: &mut Document, region: NodeId) {
    let Some(launch) = Selector::parse(&format!(".{LAUNCH_CLASS}")) else {
        return;
    };
    for control in doc.query_within(region, &launch) {
        let already = doc
            .get(control)
            .and_then(|node| node.attr(ENHANCED_ATTR))
            .is_some();
        if !already {
            doc.set_attr(control, ENHANCED_ATTR, "true");
        }
    }
}

/// Resolves a click on or inside a launch control to the attachment id it
/// carries. Clicks anywhere else resolve to nothing.
pub fn launch_target(doc: &Document, clicked: NodeId) -> Option<String> {
    let mut current = Some(clicked);
    while let Some(id) = current {
        let node = doc.get(id)?;
        if node.has_class(LAUNCH_CLASS) {
            return node
                .attr(ATTACHMENT_ID_ATTR)
                .map(str::to_string)
                .filter(|value| !value.is_empty());
        }
        current = node.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use altpilot_contracts::dom::NodeSpec;

    fn launch_button(asset_id: &str) -> NodeSpec {
        NodeSpec::new("button")
            .class(LAUNCH_CLASS)
            .attr(ATTACHMENT_ID_ATTR, asset_id)
    }

    fn modal_with_button(asset_id: &str) -> NodeSpec {
        NodeSpec::new("div")
            .class("media-modal-content")
            .child(launch_button(asset_id))
    }

    #[test]
    fn polling_stops_after_exactly_max_checks() {
        let mut doc = Document::from_snapshot(&[modal_with_button("42")]);
        let mut monitor = ModalMonitor::new(MonitorConfig {
            max_checks: 3,
            ..MonitorConfig::default()
        });

        for _ in 0..3 {
            assert!(!monitor.poll(&mut doc).is_empty());
        }
        assert!(!monitor.polling_active());
        assert!(monitor.poll(&mut doc).is_empty());
        assert!(monitor.poll(&mut doc).is_empty());
    }

    #[test]
    fn enhancement_is_idempotent_across_passes() {
        let mut doc = Document::from_snapshot(&[modal_with_button("42")]);
        let mut monitor = ModalMonitor::new(MonitorConfig::default());

        monitor.poll(&mut doc);
        let control = doc
            .query(&Selector::parse(&format!(".{LAUNCH_CLASS}")).expect("selector"))
            .expect("control present");
        assert_eq!(doc.get(control).and_then(|n| n.attr(ENHANCED_ATTR)), Some("true"));

        monitor.poll(&mut doc);
        assert_eq!(doc.get(control).and_then(|n| n.attr(ENHANCED_ATTR)), Some("true"));
    }

    #[test]
    fn modal_like_insertion_schedules_one_debounced_rescan() {
        let mut doc = Document::new();
        let root = doc.root();
        let mut monitor = ModalMonitor::new(MonitorConfig::default());
        let start = Instant::now();

        doc.insert(root, NodeSpec::new("div").class("modal").child(modal_with_button("42")));
        doc.insert(root, NodeSpec::new("div").class("dialog"));
        monitor.observe(&mut doc, start);
        assert!(monitor.rescan_pending());

        // Not due yet: the host may still be building the subtree.
        assert!(monitor.tick(&mut doc, start).is_empty());
        assert!(monitor.rescan_pending());

        let bindings = monitor.tick(&mut doc, start + Duration::from_millis(150));
        assert!(!bindings.is_empty());
        assert!(!monitor.rescan_pending());
    }

    #[test]
    fn unrelated_insertions_do_not_schedule_rescans() {
        let mut doc = Document::new();
        let root = doc.root();
        let mut monitor = ModalMonitor::new(MonitorConfig::default());

        doc.insert(root, NodeSpec::new("div").class("sidebar"));
        monitor.observe(&mut doc, Instant::now());
        assert!(!monitor.rescan_pending());
    }

    #[test]
    fn nested_modal_signature_counts_as_modal_like() {
        let mut doc = Document::new();
        let root = doc.root();
        let mut monitor = ModalMonitor::new(MonitorConfig::default());

        doc.insert(
            root,
            NodeSpec::new("div")
                .class("wrapper")
                .child(NodeSpec::new("div").class("et-fb-modal")),
        );
        monitor.observe(&mut doc, Instant::now());
        assert!(monitor.rescan_pending());
    }

    #[test]
    fn launch_target_resolves_from_descendants() {
        let mut doc = Document::new();
        let root = doc.root();
        let button = doc.insert(
            root,
            launch_button("42").child(NodeSpec::new("span").text("AI Tools")),
        );
        let inner = doc.get(button).expect("button").children()[0];

        assert_eq!(launch_target(&doc, button), Some("42".to_string()));
        assert_eq!(launch_target(&doc, inner), Some("42".to_string()));
        assert_eq!(launch_target(&doc, root), None);
    }

    #[test]
    fn launch_target_requires_an_attachment_id() {
        let mut doc = Document::new();
        let root = doc.root();
        let bare = doc.insert(root, NodeSpec::new("button").class(LAUNCH_CLASS));
        assert_eq!(launch_target(&doc, bare), None);
    }
}
