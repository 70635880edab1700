use serde::{Deserialize, Serialize};

/// Per-branch traversal switches.
///
/// Every recursive call receives its own copy. A scope entered by one sibling
/// is never observed by the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraversalConfig {
    pub process_includes: bool,
    pub process_bindings: bool,
    pub strip_attributes: bool,
    pub require_scope: bool,
    pub in_scope: bool,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            process_includes: true,
            process_bindings: true,
            strip_attributes: false,
            require_scope: false,
            in_scope: false,
        }
    }
}

impl TraversalConfig {
    /// Server pre-render: strip consumed directives, bind everything.
    pub fn server() -> Self {
        Self {
            strip_attributes: true,
            ..Self::default()
        }
    }

    /// Client hydration: auto-binding only inside an explicit scope.
    pub fn hydration() -> Self {
        Self {
            require_scope: true,
            ..Self::default()
        }
    }

    /// Include resolution only.
    pub fn includes_only() -> Self {
        Self {
            process_bindings: false,
            ..Self::default()
        }
    }

    /// Copy of `self` for a List or Scope subtree.
    pub fn entering_scope(self) -> Self {
        Self {
            in_scope: true,
            ..self
        }
    }

    /// Hydration guard for form-control auto-binding.
    pub fn allows_auto_binding(&self) -> bool {
        !self.require_scope || self.in_scope
    }
}

/// Options for the rendering helpers in [`crate::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    #[serde(flatten)]
    pub traversal: TraversalConfig,
    /// Run the `\{` / `\}` unescape pass after binding.
    pub unescape_braces: bool,
    /// Append the hydration state `<script>` to `<head>`.
    pub inject_state: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            traversal: TraversalConfig::default(),
            unescape_braces: true,
            inject_state: false,
        }
    }
}

impl RenderOptions {
    pub fn server() -> Self {
        Self {
            traversal: TraversalConfig::server(),
            inject_state: true,
            ..Self::default()
        }
    }
}
