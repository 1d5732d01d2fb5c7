//! Keybindings materialized for a concrete keyboard layout

use crate::keybinding::{OperatingSystem, ScanCodeBinding};
use crate::labels::{
    Modifiers, ARIA_LABEL_PROVIDER, UI_LABEL_PROVIDER, USER_SETTINGS_LABEL_PROVIDER,
};

/// Label and dispatch data of one part, computed by the keyboard mapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PartData {
    pub binding: ScanCodeBinding,
    pub ui_label: Option<String>,
    pub aria_label: Option<String>,
    pub user_settings_label: Option<String>,
    pub dispatch: Option<String>,
    pub wysiwyg: bool,
}

impl PartData {
    fn modifiers(&self) -> Modifiers {
        Modifiers {
            ctrl_key: self.binding.ctrl_key,
            shift_key: self.binding.shift_key,
            alt_key: self.binding.alt_key,
            meta_key: self.binding.meta_key,
        }
    }
}

/// Modifier flags and key labels of one part, for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKeybindingPart {
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub alt_key: bool,
    pub meta_key: bool,
    pub key_label: Option<String>,
    pub key_aria_label: Option<String>,
}

/// A keybinding expressed as one or two scan-code presses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKeybinding {
    os: OperatingSystem,
    parts: Vec<PartData>,
}

impl ResolvedKeybinding {
    pub(crate) fn new(os: OperatingSystem, parts: Vec<PartData>) -> Self {
        ResolvedKeybinding { os, parts }
    }

    fn render(
        &self,
        provider: &crate::labels::ModifierLabelProvider,
        key: impl Fn(&PartData) -> Option<&str>,
    ) -> Option<String> {
        let parts: Vec<(Modifiers, Option<&str>)> =
            self.parts.iter().map(|p| (p.modifiers(), key(p))).collect();
        provider.to_label(self.os, &parts)
    }

    /// Label for menus, e.g. `Ctrl+K` or `⌘K`
    pub fn label(&self) -> Option<String> {
        self.render(&UI_LABEL_PROVIDER, |p| p.ui_label.as_deref())
    }

    /// Label for screen readers, e.g. `Control+K`
    pub fn aria_label(&self) -> Option<String> {
        self.render(&ARIA_LABEL_PROVIDER, |p| p.aria_label.as_deref())
    }

    /// Text accepted by the user keybinding parser, e.g. `ctrl+k` or `ctrl+[KeyK]`
    pub fn user_settings_label(&self) -> Option<String> {
        self.render(&USER_SETTINGS_LABEL_PROVIDER, |p| {
            p.user_settings_label.as_deref()
        })
    }

    /// Whether the UI label matches what is printed on the key caps
    pub fn is_wysiwyg(&self) -> bool {
        self.parts.iter().all(|p| p.wysiwyg)
    }

    pub fn is_chord(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn bindings(&self) -> Vec<ScanCodeBinding> {
        self.parts.iter().map(|p| p.binding).collect()
    }

    pub fn parts(&self) -> Vec<ResolvedKeybindingPart> {
        self.parts
            .iter()
            .map(|p| ResolvedKeybindingPart {
                ctrl_key: p.binding.ctrl_key,
                shift_key: p.binding.shift_key,
                alt_key: p.binding.alt_key,
                meta_key: p.binding.meta_key,
                key_label: p.ui_label.clone(),
                key_aria_label: p.aria_label.clone(),
            })
            .collect()
    }

    /// Dispatch strings of the first and chord part. `None` means the part
    /// cannot be dispatched, e.g. a bare modifier press.
    pub fn dispatch_parts(&self) -> (Option<&str>, Option<&str>) {
        let dispatch = |index: usize| self.parts.get(index).and_then(|p| p.dispatch.as_deref());
        (dispatch(0), dispatch(1))
    }
}
