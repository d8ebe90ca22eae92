use std::path::PathBuf;

use tracing::warn;

use crate::export::model::{
    Easing, ExportData, Keyframe, ObjectAnimation, ObjectKind, ObjectStyle, ObjectTransform,
    SceneObject, Timeline, TimelineTrack,
};
use crate::foundation::error::{FrameloomError, FrameloomResult};
use crate::scene::snapshot::{SceneSnapshot, Serializable};

/// Options for [`Exporter`].
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Document title embedded in the artifact.
    pub title: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            title: "frameloom export".to_owned(),
        }
    }
}

/// Result of an export. Failures are reported here rather than as `Err`: the
/// export path degrades gracefully for partially-malformed scenes instead of
/// aborting the pipeline.
#[derive(Clone, Debug)]
pub struct ExportOutcome {
    /// Whether the artifact was produced.
    pub success: bool,
    /// The path the caller asked for, echoed back on success. The exporter
    /// never touches disk itself.
    pub output_path: Option<PathBuf>,
    /// The full artifact, for the caller to persist.
    pub content: Option<String>,
    /// Total artifact size in bytes.
    pub file_size: usize,
    /// Size of the embedded scene data JSON in bytes.
    pub scene_data_size: usize,
    /// Size of the markup and playback runtime in bytes.
    pub assets_size: usize,
    /// Failure message when `success` is false.
    pub error: Option<String>,
}

/// Exports a serializable scene into a self-contained interactive artifact.
///
/// The artifact embeds the normalized object/animation/timeline data inline
/// together with a minimal playback runtime (linear keyframe interpolation,
/// the four standard easings, play/pause/restart controls and a progress
/// indicator), so it replays without any server round-trips.
pub struct Exporter {
    opts: ExportOptions,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(ExportOptions::default())
    }
}

impl Exporter {
    /// Construct an exporter.
    pub fn new(opts: ExportOptions) -> Self {
        Self { opts }
    }

    /// Export a scene. Never returns `Err`; inspect
    /// [`ExportOutcome::success`].
    pub fn export(
        &self,
        scene: &dyn Serializable,
        output_path: impl Into<PathBuf>,
    ) -> ExportOutcome {
        match self.build_artifact(scene) {
            Ok((content, scene_data_size)) => {
                let file_size = content.len();
                ExportOutcome {
                    success: true,
                    output_path: Some(output_path.into()),
                    content: Some(content),
                    file_size,
                    scene_data_size,
                    assets_size: file_size - scene_data_size,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "scene export failed");
                ExportOutcome {
                    success: false,
                    output_path: None,
                    content: None,
                    file_size: 0,
                    scene_data_size: 0,
                    assets_size: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn build_artifact(&self, scene: &dyn Serializable) -> FrameloomResult<(String, usize)> {
        let snapshot = SceneSnapshot::capture(scene)?;
        let data = extract_export_data(&snapshot)?;
        let scene_json =
            serde_json::to_string(&data).map_err(|e| FrameloomError::serde(e.to_string()))?;
        // `<` only occurs inside JSON strings; escaping it keeps a literal
        // `</script>` in scene data from closing the artifact's script block.
        let scene_json = scene_json.replace('<', "\\u003c");
        let scene_data_size = scene_json.len();

        let content = ARTIFACT_TEMPLATE
            .replace("__TITLE__", &html_escape(&self.opts.title))
            .replace("__SCENE_HASH__", &snapshot.hash)
            .replace("__SCENE_TYPE__", &html_escape(&snapshot.type_id))
            .replace("__SCENE_DATA__", &scene_json);

        Ok((content, scene_data_size))
    }
}

/// Normalize a generic snapshot into the three export views.
///
/// Partially-malformed input degrades: objects without an id are skipped,
/// unknown type tags fall back to `rect`, and missing sections become empty
/// lists. Only non-JSON input is a hard error.
pub(crate) fn extract_export_data(snapshot: &SceneSnapshot) -> FrameloomResult<ExportData> {
    let root: serde_json::Value = serde_json::from_str(&snapshot.data)
        .map_err(|e| FrameloomError::snapshot(format!("scene snapshot is not valid JSON: {e}")))?;

    let mut objects = Vec::new();
    if let Some(list) = root.get("objects").and_then(|v| v.as_array()) {
        for raw in list {
            let Some(id) = raw.get("id").and_then(|v| v.as_str()) else {
                warn!("skipping scene object without an id");
                continue;
            };
            // The type tag is an explicit contract field, not inferred from
            // class names. Unknown tags degrade to a rectangle.
            let kind = match raw.get("type").and_then(|v| v.as_str()) {
                Some(tag) => ObjectKind::from_tag(tag).unwrap_or_else(|| {
                    warn!(id, tag, "unknown object type tag; defaulting to rect");
                    ObjectKind::Rect
                }),
                None => {
                    warn!(id, "scene object missing type tag; defaulting to rect");
                    ObjectKind::Rect
                }
            };

            let transform = raw
                .get("transform")
                .cloned()
                .map(serde_json::from_value::<ObjectTransform>)
                .transpose()
                .unwrap_or_default()
                .unwrap_or_default();
            let style = raw
                .get("style")
                .cloned()
                .map(serde_json::from_value::<ObjectStyle>)
                .transpose()
                .unwrap_or_default()
                .unwrap_or_default();

            objects.push(SceneObject {
                id: id.to_owned(),
                kind,
                transform,
                style,
            });
        }
    }

    let mut animations = Vec::new();
    if let Some(list) = root.get("animations").and_then(|v| v.as_array()) {
        for raw in list {
            let object_id = raw
                .get("objectId")
                .or_else(|| raw.get("object_id"))
                .and_then(|v| v.as_str());
            let Some(object_id) = object_id else {
                warn!("skipping animation without an object id");
                continue;
            };

            let keyframes = raw
                .get("keyframes")
                .and_then(|v| v.as_array())
                .map(|kfs| kfs.iter().map(parse_keyframe).collect::<Vec<_>>())
                .unwrap_or_default();

            let easing = raw
                .get("easing")
                .and_then(|v| v.as_str())
                .and_then(Easing::from_tag)
                .unwrap_or_default();

            let duration = raw
                .get("duration")
                .and_then(|v| v.as_f64())
                .unwrap_or_else(|| {
                    keyframes.last().map(|k: &Keyframe| k.time).unwrap_or(0.0)
                });

            animations.push(ObjectAnimation {
                object_id: object_id.to_owned(),
                keyframes,
                easing,
                duration,
                looped: raw.get("loop").and_then(|v| v.as_bool()).unwrap_or(false),
            });
        }
    }

    let timeline = Timeline {
        duration: animations.iter().fold(0.0f64, |d, a| d.max(a.duration)),
        tracks: animations
            .iter()
            .map(|a| TimelineTrack {
                object_id: a.object_id.clone(),
                keyframes: a.keyframes.clone(),
            })
            .collect(),
    };

    Ok(ExportData {
        objects,
        animations,
        timeline,
    })
}

fn parse_keyframe(raw: &serde_json::Value) -> Keyframe {
    let time = raw.get("time").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let mut properties = std::collections::BTreeMap::new();
    if let Some(map) = raw.get("properties").and_then(|v| v.as_object()) {
        for (k, v) in map {
            if let Some(n) = v.as_f64() {
                properties.insert(k.clone(), n);
            }
        }
    }
    Keyframe { time, properties }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// The self-contained artifact shell. Placeholders are substituted rather
/// than formatted so the embedded CSS/JS braces stay literal.
const ARTIFACT_TEMPLATE: &str = r##"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>__TITLE__</title>
<meta name="generator" content="frameloom">
<meta name="scene-hash" content="__SCENE_HASH__">
<meta name="scene-type" content="__SCENE_TYPE__">
<style>
  body { margin: 0; background: #111; color: #eee; font: 14px system-ui, sans-serif; }
  #stage { position: relative; width: 100vw; height: calc(100vh - 48px); overflow: hidden; }
  #stage .obj { position: absolute; transform-origin: center; }
  #controls { display: flex; align-items: center; gap: 8px; height: 48px; padding: 0 12px; background: #1b1b1b; }
  #controls button { background: #333; color: #eee; border: 0; border-radius: 4px; padding: 6px 14px; cursor: pointer; }
  #progress { flex: 1; height: 4px; background: #333; border-radius: 2px; }
  #progress-fill { height: 100%; width: 0; background: #5b9dd9; border-radius: 2px; }
</style>
</head>
<body>
<div id="stage"></div>
<div id="controls">
  <button id="play">Play</button>
  <button id="pause">Pause</button>
  <button id="restart">Restart</button>
  <div id="progress"><div id="progress-fill"></div></div>
</div>
<script>
const SCENE = __SCENE_DATA__;

const EASING = {
  "linear": t => t,
  "ease-in": t => t * t,
  "ease-out": t => 1 - (1 - t) * (1 - t),
  "ease-in-out": t => t < 0.5 ? 2 * t * t : 1 - Math.pow(-2 * t + 2, 2) / 2,
};

const stage = document.getElementById("stage");
const fill = document.getElementById("progress-fill");
const nodes = {};

for (const obj of SCENE.objects) {
  const el = document.createElement("div");
  el.className = "obj";
  el.dataset.id = obj.id;
  const st = obj.style || {};
  el.style.background = st.fill || "#5b9dd9";
  if (st.stroke) el.style.border = (st.strokeWidth || 1) + "px solid " + st.stroke;
  el.style.width = "80px";
  el.style.height = "80px";
  if (obj.type === "circle" || obj.type === "ellipse") el.style.borderRadius = "50%";
  applyProps(el, baseProps(obj));
  stage.appendChild(el);
  nodes[obj.id] = { el: el, base: baseProps(obj) };
}

function baseProps(obj) {
  const t = obj.transform || {};
  return {
    x: t.x || 0, y: t.y || 0,
    scaleX: t.scaleX == null ? 1 : t.scaleX,
    scaleY: t.scaleY == null ? 1 : t.scaleY,
    rotation: t.rotation || 0,
    opacity: t.opacity == null ? 1 : t.opacity,
  };
}

function applyProps(el, p) {
  el.style.transform =
    "translate(" + p.x + "px," + p.y + "px) " +
    "rotate(" + p.rotation + "deg) " +
    "scale(" + p.scaleX + "," + p.scaleY + ")";
  el.style.opacity = p.opacity;
}

function sample(anim, tMs) {
  const kfs = anim.keyframes;
  if (!kfs.length) return {};
  if (tMs <= kfs[0].time) return kfs[0].properties;
  const last = kfs[kfs.length - 1];
  if (tMs >= last.time) return last.properties;
  for (let i = 1; i < kfs.length; i++) {
    if (tMs <= kfs[i].time) {
      const a = kfs[i - 1], b = kfs[i];
      const span = b.time - a.time;
      const raw = span > 0 ? (tMs - a.time) / span : 1;
      const t = (EASING[anim.easing] || EASING.linear)(raw);
      const out = {};
      for (const k in b.properties) {
        const from = a.properties[k] == null ? b.properties[k] : a.properties[k];
        out[k] = from + (b.properties[k] - from) * t;
      }
      return out;
    }
  }
  return last.properties;
}

const duration = SCENE.timeline.duration || 0;
let playing = false;
let startedAt = 0;
let offset = 0;

function tick(now) {
  if (!playing) return;
  let t = now - startedAt + offset;
  const looping = SCENE.animations.some(a => a.loop);
  if (duration > 0 && t >= duration) {
    if (looping) { t = t % duration; }
    else { t = duration; playing = false; }
  }
  for (const anim of SCENE.animations) {
    const node = nodes[anim.objectId];
    if (!node) continue;
    const props = sample(anim, Math.min(t, anim.duration));
    applyProps(node.el, Object.assign({}, node.base, props));
  }
  fill.style.width = duration > 0 ? (100 * t / duration) + "%" : "0";
  if (playing) requestAnimationFrame(tick);
}

document.getElementById("play").addEventListener("click", () => {
  if (playing) return;
  playing = true;
  startedAt = performance.now();
  requestAnimationFrame(tick);
});
document.getElementById("pause").addEventListener("click", () => {
  if (!playing) return;
  offset += performance.now() - startedAt;
  playing = false;
});
document.getElementById("restart").addEventListener("click", () => {
  offset = 0;
  startedAt = performance.now();
  playing = true;
  requestAnimationFrame(tick);
});
</script>
</body>
</html>
"##;
