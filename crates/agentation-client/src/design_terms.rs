//! Design vocabulary.
//!
//! Annotations may reference design terms by short id (`"gnb"`). Before a
//! submission goes on the wire the ids are replaced by each term's prompt
//! text, so the AI sees `"GNB (Global Navigation Bar) - ..."`.

use std::fmt;

use agentation_protocols::Annotation;

/// Maps a design term id to the text sent to the AI.
pub trait DesignTermResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Option<String>;
}

impl<F> DesignTermResolver for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, id: &str) -> Option<String> {
        self(id)
    }
}

/// Replace design term ids with their resolved text. Unknown ids pass through.
pub fn expand_design_terms(
    annotations: Vec<Annotation>,
    resolver: &dyn DesignTermResolver,
) -> Vec<Annotation> {
    annotations
        .into_iter()
        .map(|mut annotation| {
            for term in annotation.design_terms_mut().iter_mut() {
                if let Some(text) = resolver.resolve(term) {
                    *term = text;
                }
            }
            annotation
        })
        .collect()
}

/// Category of a design term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesignCategory {
    Layout,
    Interaction,
    Feedback,
    Visual,
    Animation,
    Concept,
}

impl DesignCategory {
    /// All categories in display order.
    pub const ALL: [DesignCategory; 6] = [
        DesignCategory::Layout,
        DesignCategory::Interaction,
        DesignCategory::Feedback,
        DesignCategory::Visual,
        DesignCategory::Animation,
        DesignCategory::Concept,
    ];

    pub fn id(self) -> &'static str {
        match self {
            DesignCategory::Layout => "layout",
            DesignCategory::Interaction => "interaction",
            DesignCategory::Feedback => "feedback",
            DesignCategory::Visual => "visual",
            DesignCategory::Animation => "animation",
            DesignCategory::Concept => "concept",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }
}

impl fmt::Display for DesignCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One entry of the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignTerm {
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    pub category: DesignCategory,
    /// Text sent to the AI in place of the id.
    pub prompt: &'static str,
}

const fn term(
    id: &'static str,
    name: &'static str,
    category: DesignCategory,
    prompt: &'static str,
) -> DesignTerm {
    DesignTerm {
        id,
        name,
        category,
        prompt,
    }
}

use DesignCategory::*;

static BUILTIN_TERMS: [DesignTerm; 40] = [
    term("gnb", "GNB", Layout, "GNB (Global Navigation Bar) - Fixed navigation at top of page"),
    term("sticky-header", "Sticky Header", Layout, "Sticky Header - Header that stays fixed while scrolling"),
    term("hero-section", "Hero Section", Layout, "Hero Section - Main visual area at top of page"),
    term("breadcrumbs", "Breadcrumbs", Layout, "Breadcrumbs - Navigation path indicator"),
    term("footer", "Footer", Layout, "Footer - Bottom section with links and info"),
    term("bento-grid", "Bento Grid", Layout, "Bento Grid - Box layout grid like a bento box"),
    term("drawer-menu", "Drawer Menu", Layout, "Drawer Menu - Slide-out side panel menu"),
    term("bottom-sheet", "Bottom Sheet", Layout, "Bottom Sheet - Panel sliding up from bottom"),
    term("cta-button", "CTA Button", Interaction, "CTA Button - Primary call-to-action button"),
    term("toggle", "Toggle", Interaction, "Toggle Switch - On/off switch control"),
    term("accordion", "Accordion", Interaction, "Accordion - Expandable content panel"),
    term("chip", "Chip", Interaction, "Chip - Small tag/filter button"),
    term("tooltip", "Tooltip", Interaction, "Tooltip - Help text on hover"),
    term("carousel", "Carousel", Interaction, "Carousel - Sliding content viewer"),
    term("magnetic-button", "Magnetic Button", Interaction, "Magnetic Button - Cursor-following interactive button"),
    term("skeleton-screen", "Skeleton Screen", Feedback, "Skeleton Screen - Loading placeholder UI"),
    term("toast", "Toast", Feedback, "Toast/Snackbar - Temporary notification message"),
    term("badge", "Badge", Feedback, "Badge - Notification indicator dot/number"),
    term("empty-state", "Empty State", Feedback, "Empty State - No data placeholder screen"),
    term("micro-interaction", "Micro-interaction", Feedback, "Micro-interaction - Subtle animation feedback"),
    term("progressive-disclosure", "Progressive Disclosure", Feedback, "Progressive Disclosure - Gradual information reveal"),
    term("glassmorphism", "Glassmorphism", Visual, "Glassmorphism - Frosted glass effect (blur + transparency)"),
    term("gradient-border", "Gradient Border", Visual, "Gradient Border - Border with color gradient"),
    term("neon-pulse", "Neon Pulse", Visual, "Neon Pulse - Glowing neon light effect"),
    term("dark-mode", "Dark Mode", Visual, "Dark Mode - Dark theme color scheme"),
    term("design-token", "Design Token", Visual, "Design Token - CSS variable-based design system"),
    term("z-index", "Z-index", Visual, "Z-index - Layer stacking order management"),
    term("fluid-typography", "Fluid Typography", Visual, "Fluid Typography - Responsive font sizing (clamp/vw)"),
    term("isometric-design", "Isometric Design", Visual, "Isometric Design - 3D illustration at 45-degree angles"),
    term("parallax", "Parallax", Animation, "Parallax - Scroll-based multi-layer movement"),
    term("kinetic-typography", "Kinetic Typography", Animation, "Kinetic Typography - Animated text motion"),
    term("morphing", "Morphing", Animation, "Morphing - Shape transformation animation"),
    term("3d-tilt-effect", "3D Tilt Effect", Animation, "3D Tilt Effect - Cursor-tracking perspective tilt"),
    term("spring-animation", "Spring Animation", Animation, "Spring Animation - Elastic bouncy motion"),
    term("stagger-animation", "Stagger Animation", Animation, "Stagger Animation - Sequential reveal animation"),
    term("easing", "Easing", Animation, "Easing Function - Animation timing curves (ease-in-out, cubic-bezier)"),
    term("wireframe", "Wireframe", Concept, "Wireframe - Basic structural blueprint"),
    term("mockup", "Mockup", Concept, "Mockup - Static design with colors and images"),
    term("prototype", "Prototype", Concept, "Prototype - Interactive clickable simulation"),
    term("inclusive-design", "Inclusive Design", Concept, "Inclusive Design - Accessibility-focused design (a11y)"),
];

/// A lookup table of design terms.
#[derive(Debug, Clone)]
pub struct DesignTermCatalog {
    terms: Vec<DesignTerm>,
}

impl Default for DesignTermCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DesignTermCatalog {
    /// The built-in vocabulary.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_TERMS.to_vec())
    }

    pub fn new(terms: Vec<DesignTerm>) -> Self {
        Self { terms }
    }

    pub fn get(&self, id: &str) -> Option<&DesignTerm> {
        self.terms.iter().find(|t| t.id == id)
    }

    pub fn by_category(&self, category: DesignCategory) -> impl Iterator<Item = &DesignTerm> {
        self.terms.iter().filter(move |t| t.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DesignTerm> {
        self.terms.iter()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl DesignTermResolver for DesignTermCatalog {
    fn resolve(&self, id: &str) -> Option<String> {
        self.get(id).map(|t| t.prompt.to_string())
    }
}
