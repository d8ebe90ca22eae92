use std::collections::BTreeMap;

/// Easing functions understood by the embedded playback runtime.
///
/// The runtime ships the same four curves; keeping this enum in lockstep with
/// the JS implementation is what makes exported playback match engine-side
/// sampling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Easing {
    /// Linear interpolation.
    #[default]
    #[serde(rename = "linear")]
    Linear,
    /// Quadratic ease-in.
    #[serde(rename = "ease-in")]
    EaseIn,
    /// Quadratic ease-out.
    #[serde(rename = "ease-out")]
    EaseOut,
    /// Quadratic ease-in/out.
    #[serde(rename = "ease-in-out")]
    EaseInOut,
}

impl Easing {
    /// Apply this easing function to normalized progress `t` in `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
        }
    }

    /// Parse the stable tag form (`"ease-in"` etc.). Unknown tags are `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "linear" => Some(Self::Linear),
            "ease-in" | "easeIn" => Some(Self::EaseIn),
            "ease-out" | "easeOut" => Some(Self::EaseOut),
            "ease-in-out" | "easeInOut" => Some(Self::EaseInOut),
            _ => None,
        }
    }
}

/// Shape class of an exported scene object.
///
/// Resolved from an explicit `type` tag on each object; there is no
/// inference from class names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Axis-aligned rectangle. Also the fallback for unknown tags.
    #[default]
    Rect,
    /// Circle.
    Circle,
    /// Ellipse.
    Ellipse,
    /// Text run.
    Text,
    /// Vector path.
    Path,
    /// Raster image.
    Image,
    /// Grouping node.
    Group,
}

impl ObjectKind {
    /// Parse an explicit type tag. Unknown tags are `None`; the extractor
    /// decides the fallback.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "rect" | "rectangle" => Some(Self::Rect),
            "circle" => Some(Self::Circle),
            "ellipse" => Some(Self::Ellipse),
            "text" => Some(Self::Text),
            "path" => Some(Self::Path),
            "image" => Some(Self::Image),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// 2D placement of an exported object.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectTransform {
    /// X position in canvas units.
    pub x: f64,
    /// Y position in canvas units.
    pub y: f64,
    /// Horizontal scale factor.
    pub scale_x: f64,
    /// Vertical scale factor.
    pub scale_y: f64,
    /// Rotation in degrees, clockwise.
    pub rotation: f64,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
}

impl Default for ObjectTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            opacity: 1.0,
        }
    }
}

/// Visual styling of an exported object.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectStyle {
    /// Fill color (CSS color string).
    pub fill: Option<String>,
    /// Stroke color (CSS color string).
    pub stroke: Option<String>,
    /// Stroke width in canvas units.
    pub stroke_width: Option<f64>,
}

/// One object in the normalized export view.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneObject {
    /// Stable object id; animations bind to it.
    pub id: String,
    /// Shape class.
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// Placement.
    pub transform: ObjectTransform,
    /// Styling.
    pub style: ObjectStyle,
}

/// A single keyframe: a time offset plus numeric property targets.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    /// Offset from animation start, in milliseconds.
    pub time: f64,
    /// Property name → target value. `BTreeMap` keeps serialization ordered
    /// so identical snapshots export byte-identical artifacts.
    pub properties: BTreeMap<String, f64>,
}

/// An animation bound to one object.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAnimation {
    /// Id of the object this animation drives.
    pub object_id: String,
    /// Keyframes in ascending time order.
    pub keyframes: Vec<Keyframe>,
    /// Easing applied between keyframes.
    pub easing: Easing,
    /// Total duration in milliseconds.
    pub duration: f64,
    /// Whether playback loops.
    #[serde(rename = "loop")]
    pub looped: bool,
}

/// One ordered track of the export timeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineTrack {
    /// Object the track drives.
    pub object_id: String,
    /// Keyframes in ascending time order.
    pub keyframes: Vec<Keyframe>,
}

/// Ordered timeline across all animated objects.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    /// Overall duration in milliseconds (max across animations).
    pub duration: f64,
    /// Per-object tracks, in animation declaration order.
    pub tracks: Vec<TimelineTrack>,
}

/// The normalized data embedded into an exported artifact.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    /// Scene objects.
    pub objects: Vec<SceneObject>,
    /// Animations.
    pub animations: Vec<ObjectAnimation>,
    /// Timeline derived from the animations.
    pub timeline: Timeline,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: ObjectKind::Rect,
            transform: ObjectTransform::default(),
            style: ObjectStyle::default(),
        }
    }
}
