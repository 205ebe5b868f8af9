//! Typed bodies for the RPC messages this crate sends and receives
//!
//! Field names serialize in the head unit's camelCase convention;
//! optional fields are omitted entirely rather than sent as null.

use serde::{Deserialize, Serialize};

/// How an image is referenced on the head unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageType {
    /// Pre-installed image addressed by well-known name
    Static,
    /// Image uploaded by the application
    Dynamic,
}

/// Image reference inside a choice or show request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Head-unit file name of the image
    pub value: String,
    /// Static or dynamic
    pub image_type: ImageType,
}

/// One selectable row inside an interaction choice set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Head-unit-unique choice ID
    #[serde(rename = "choiceID")]
    pub choice_id: u32,
    /// Primary row text
    pub menu_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Optional second line
    pub secondary_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Optional third line
    pub tertiary_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Voice phrases activating this row
    pub vr_commands: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Primary row image
    pub image: Option<Image>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Secondary row image
    pub secondary_image: Option<Image>,
}

/// Upload one choice set to the head unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInteractionChoiceSet {
    /// ID the set will be referenced by in `PerformInteraction`
    #[serde(rename = "interactionChoiceSetID")]
    pub interaction_choice_set_id: u32,
    /// Rows of the set
    pub choice_set: Vec<Choice>,
}

/// Remove a previously uploaded choice set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteInteractionChoiceSet {
    /// ID used during `CreateInteractionChoiceSet`
    #[serde(rename = "interactionChoiceSetID")]
    pub interaction_choice_set_id: u32,
}

/// How the user may act on a presented interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionMode {
    /// Touch selection only
    #[default]
    ManualOnly,
    /// Voice selection only
    VrOnly,
    /// Touch or voice
    Both,
}

/// On-screen arrangement of a presented interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutMode {
    /// Icon grid
    IconOnly,
    /// Icon grid with a search field
    IconWithSearch,
    /// Vertical list
    ListOnly,
    /// Vertical list with a search field
    ListWithSearch,
    /// Keyboard-only interaction
    Keyboard,
}

/// Present choice sets (or a keyboard) for user selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformInteraction {
    /// Text shown while the interaction is on screen
    pub initial_text: String,
    /// Touch/voice mode
    pub interaction_mode: InteractionMode,
    /// Choice set IDs to present; empty for keyboard-only
    #[serde(rename = "interactionChoiceSetIDList")]
    pub interaction_choice_set_id_list: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Timeout in milliseconds
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Layout override
    pub interaction_layout: Option<LayoutMode>,
    #[serde(rename = "cancelID", skip_serializing_if = "Option::is_none")]
    /// ID a later `CancelInteraction` may use to dismiss this
    pub cancel_id: Option<u32>,
}

/// What the user did to make a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    /// Touch selection
    Menu,
    /// Voice selection
    Vr,
    /// Keyboard entry
    Keyboard,
}

/// Response parameters of `PerformInteraction`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformInteractionResponse {
    /// Selected choice, when the user picked a row
    #[serde(rename = "choiceID", default)]
    pub choice_id: Option<u32>,
    /// Free text, when the user typed into a searchable interaction
    #[serde(default)]
    pub manual_text_entry: Option<String>,
    /// How the selection was made
    #[serde(default)]
    pub trigger_source: Option<TriggerSource>,
}

/// Dismiss an in-progress interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInteraction {
    /// `cancel_id` the interaction was presented with
    #[serde(rename = "cancelID")]
    pub cancel_id: u32,
    /// Wire value of the function being cancelled
    #[serde(rename = "functionID")]
    pub function_id: u32,
}

/// Keyboard language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    /// US English
    #[default]
    #[serde(rename = "EN-US")]
    EnUs,
    /// German
    #[serde(rename = "DE-DE")]
    DeDe,
    /// French
    #[serde(rename = "FR-FR")]
    FrFr,
}

/// Physical keyboard arrangement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyboardLayout {
    /// Standard QWERTY
    #[default]
    Qwerty,
    /// German QWERTZ
    Qwertz,
    /// French AZERTY
    Azerty,
    /// Digits only
    Numeric,
}

/// When keypress events are delivered during keyboard entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeypressMode {
    /// One event per key
    SingleKeypress,
    /// Events queued and delivered on submit
    QueueKeypresses,
    /// Full current entry resent on every key
    #[default]
    ResendCurrentEntry,
}

/// Keyboard configuration sent with keyboard interactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyboardProperties {
    /// Keyboard language
    pub language: Language,
    /// Key arrangement
    pub keyboard_layout: KeyboardLayout,
    /// Keypress delivery mode
    pub keypress_mode: KeypressMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Restrict input to these characters
    pub limited_character_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Autocomplete suggestion shown to the user
    pub auto_complete_text: Option<String>,
}

/// Update session-global properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetGlobalProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Keyboard configuration for subsequent keyboard interactions
    pub keyboard_properties: Option<KeyboardProperties>,
}

/// HMI level of the application window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HmiLevel {
    /// Full user attention
    Full,
    /// Visible but backgrounded
    Limited,
    /// Running without display access
    Background,
    /// Not launched on the head unit
    None,
}

/// System context accompanying the HMI status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemContext {
    /// Normal operation
    Main,
    /// Voice session in progress
    Vrsession,
    /// Head-unit menu open
    Menu,
    /// Another window obscures the app
    HmiObscured,
    /// A modal alert is on screen
    Alert,
}

/// `OnHMIStatus` notification body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnHmiStatus {
    /// Current HMI level
    pub hmi_level: HmiLevel,
    /// Current system context
    pub system_context: SystemContext,
}

/// Kind of keyboard event during a keyboard interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyboardEventKind {
    /// A key was pressed
    KeypressEvent,
    /// The user submitted the entry
    EntrySubmitted,
    /// The entry was routed to voice recognition
    EntryVoice,
    /// The user cancelled entry
    EntryCancelled,
    /// The system aborted entry
    EntryAborted,
}

/// `OnKeyboardInput` notification body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnKeyboardInput {
    /// Event kind
    pub event: KeyboardEventKind,
    /// Current entry text, when applicable
    #[serde(default)]
    pub data: Option<String>,
}
