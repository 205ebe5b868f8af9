//! Choice cells, choice sets, and their validation rules

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::file::Artwork;
use crate::rpc::messages::{Choice, LayoutMode, OnKeyboardInput, TriggerSource};

use super::error::{ChoiceSetError, ChoiceValidationError};

/// Lower bound for a presentation timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for a presentation timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(100);

/// One selectable item.
///
/// Equality and hashing cover content only (texts, voice commands,
/// artwork identity), never an assigned choice ID: the manager's
/// inventory is keyed by value so a re-preloaded cell deduplicates
/// against the copy already on the head unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChoiceCell {
    text: String,
    secondary_text: Option<String>,
    tertiary_text: Option<String>,
    voice_commands: Option<Vec<String>>,
    artwork: Option<Artwork>,
    secondary_artwork: Option<Artwork>,
}

impl ChoiceCell {
    /// Create a cell with the required primary text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            secondary_text: None,
            tertiary_text: None,
            voice_commands: None,
            artwork: None,
            secondary_artwork: None,
        }
    }

    /// Optional second line
    #[must_use]
    pub fn with_secondary_text(mut self, text: impl Into<String>) -> Self {
        self.secondary_text = Some(text.into());
        self
    }

    /// Optional third line
    #[must_use]
    pub fn with_tertiary_text(mut self, text: impl Into<String>) -> Self {
        self.tertiary_text = Some(text.into());
        self
    }

    /// Voice phrases activating this cell
    #[must_use]
    pub fn with_voice_commands(mut self, commands: Vec<String>) -> Self {
        self.voice_commands = Some(commands);
        self
    }

    /// Primary artwork
    #[must_use]
    pub fn with_artwork(mut self, artwork: Artwork) -> Self {
        self.artwork = Some(artwork);
        self
    }

    /// Secondary artwork
    #[must_use]
    pub fn with_secondary_artwork(mut self, artwork: Artwork) -> Self {
        self.secondary_artwork = Some(artwork);
        self
    }

    /// Primary text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Second line, if set
    #[must_use]
    pub fn secondary_text(&self) -> Option<&str> {
        self.secondary_text.as_deref()
    }

    /// Third line, if set
    #[must_use]
    pub fn tertiary_text(&self) -> Option<&str> {
        self.tertiary_text.as_deref()
    }

    /// Voice phrases, if set
    #[must_use]
    pub fn voice_commands(&self) -> Option<&[String]> {
        self.voice_commands.as_deref()
    }

    /// Primary artwork, if set
    #[must_use]
    pub fn artwork(&self) -> Option<&Artwork> {
        self.artwork.as_ref()
    }

    /// Secondary artwork, if set
    #[must_use]
    pub fn secondary_artwork(&self) -> Option<&Artwork> {
        self.secondary_artwork.as_ref()
    }

    /// Build the RPC choice for this cell under its assigned ID.
    ///
    /// `vr_fallback` supplies a synthetic voice command when the head
    /// unit mandates voice commands and the cell carries none.
    pub(crate) fn to_choice(&self, choice_id: u32, vr_fallback: Option<String>) -> Choice {
        let vr_commands = match (&self.voice_commands, vr_fallback) {
            (Some(commands), _) => Some(commands.clone()),
            (None, Some(fallback)) => Some(vec![fallback]),
            (None, None) => None,
        };

        Choice {
            choice_id,
            menu_name: self.text.clone(),
            secondary_text: self.secondary_text.clone(),
            tertiary_text: self.tertiary_text.clone(),
            vr_commands,
            image: self.artwork.as_ref().map(Artwork::to_image),
            secondary_image: self.secondary_artwork.as_ref().map(Artwork::to_image),
        }
    }
}

/// Visual arrangement of a presented choice set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChoiceSetLayout {
    /// Vertical list
    #[default]
    List,
    /// Icon tiles
    Tiles,
}

impl ChoiceSetLayout {
    pub(crate) const fn to_layout_mode(self, searchable: bool) -> LayoutMode {
        match (self, searchable) {
            (Self::List, false) => LayoutMode::ListOnly,
            (Self::List, true) => LayoutMode::ListWithSearch,
            (Self::Tiles, false) => LayoutMode::IconOnly,
            (Self::Tiles, true) => LayoutMode::IconWithSearch,
        }
    }
}

/// Observer for the outcome of a presented choice set.
pub trait ChoiceSetSelectionListener: Send + Sync {
    /// The user selected a row.
    fn on_choice_selected(&self, cell: &ChoiceCell, trigger: TriggerSource, row_index: usize);

    /// The presentation failed or was superseded.
    fn on_error(&self, error: &ChoiceSetError);
}

/// Observer for keyboard input during a keyboard or searchable
/// interaction.
pub trait KeyboardListener: Send + Sync {
    /// A keyboard event arrived from the head unit.
    fn on_keyboard_event(&self, event: &OnKeyboardInput);
}

/// An ordered group of cells presented together for user selection.
#[derive(Clone)]
pub struct ChoiceSet {
    title: String,
    choices: Vec<ChoiceCell>,
    timeout: Option<Duration>,
    layout: ChoiceSetLayout,
    listener: Arc<dyn ChoiceSetSelectionListener>,
}

impl ChoiceSet {
    /// Create a set with a title shown during presentation.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        choices: Vec<ChoiceCell>,
        listener: Arc<dyn ChoiceSetSelectionListener>,
    ) -> Self {
        Self {
            title: title.into(),
            choices,
            timeout: None,
            layout: ChoiceSetLayout::default(),
            listener,
        }
    }

    /// Override the presentation timeout (valid range 5-100 s)
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the layout
    #[must_use]
    pub const fn with_layout(mut self, layout: ChoiceSetLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Presentation title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Cells of the set
    #[must_use]
    pub fn choices(&self) -> &[ChoiceCell] {
        &self.choices
    }

    /// Timeout override, if set
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Layout
    #[must_use]
    pub const fn layout(&self) -> ChoiceSetLayout {
        self.layout
    }

    /// Selection listener
    #[must_use]
    pub fn listener(&self) -> Arc<dyn ChoiceSetSelectionListener> {
        Arc::clone(&self.listener)
    }

    /// Check every set invariant without touching the wire.
    pub fn validate(&self) -> Result<(), ChoiceValidationError> {
        if self.choices.is_empty() {
            return Err(ChoiceValidationError::Empty);
        }

        if let Some(timeout) = self.timeout {
            if timeout < MIN_TIMEOUT || timeout > MAX_TIMEOUT {
                return Err(ChoiceValidationError::TimeoutOutOfRange {
                    secs: timeout.as_secs(),
                });
            }
        }

        let mut texts = HashSet::new();
        for cell in &self.choices {
            if !texts.insert(cell.text()) {
                return Err(ChoiceValidationError::DuplicateText {
                    text: cell.text().to_owned(),
                });
            }
        }

        let with_voice = self
            .choices
            .iter()
            .filter(|cell| cell.voice_commands().is_some())
            .count();
        if with_voice > 0 && with_voice < self.choices.len() {
            return Err(ChoiceValidationError::PartialVoiceCommands {
                with: with_voice,
                total: self.choices.len(),
            });
        }

        let mut phrases = HashSet::new();
        for cell in &self.choices {
            for phrase in cell.voice_commands().unwrap_or_default() {
                if !phrases.insert(phrase.as_str()) {
                    return Err(ChoiceValidationError::DuplicateVoiceCommand {
                        phrase: phrase.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for ChoiceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChoiceSet")
            .field("title", &self.title)
            .field("choices", &self.choices)
            .field("timeout", &self.timeout)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
