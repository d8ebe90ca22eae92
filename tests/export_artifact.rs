use frameloom::{
    ExportData, ExportOptions, Exporter, FrameloomError, FrameloomResult, Serializable,
    content_hash,
};

struct JsonScene {
    payload: String,
}

impl Serializable for JsonScene {
    fn serialize(&self) -> FrameloomResult<String> {
        Ok(self.payload.clone())
    }

    fn type_id(&self) -> &str {
        "composition"
    }
}

struct BrokenScene;

impl Serializable for BrokenScene {
    fn serialize(&self) -> FrameloomResult<String> {
        Err(FrameloomError::snapshot("scene graph is mid-mutation"))
    }

    fn type_id(&self) -> &str {
        "composition"
    }
}

fn demo_scene() -> JsonScene {
    JsonScene {
        payload: r##"{
          "objects": [
            {"id": "box", "type": "rect", "transform": {"x": 100.0, "y": 50.0},
             "style": {"fill": "#3a7bd5"}},
            {"id": "dot", "type": "circle", "transform": {"x": 300.0, "y": 200.0}}
          ],
          "animations": [
            {"objectId": "dot", "easing": "ease-in-out", "duration": 2000.0, "loop": true,
             "keyframes": [
               {"time": 0.0, "properties": {"x": 300.0}},
               {"time": 2000.0, "properties": {"x": 600.0}}
             ]}
          ]
        }"##
        .to_owned(),
    }
}

#[test]
fn export_produces_a_self_contained_artifact() {
    let exporter = Exporter::new(ExportOptions {
        title: "demo scene".to_owned(),
    });
    let scene = demo_scene();
    let out = exporter.export(&scene, "demo.html");

    assert!(out.success);
    assert!(out.error.is_none());
    assert_eq!(out.output_path.as_deref(), Some(std::path::Path::new("demo.html")));

    let content = out.content.unwrap();
    assert!(content.starts_with("<!doctype html>"));
    assert!(content.contains("demo scene"));
    assert!(content.contains(&content_hash(&scene.payload)));
    // Playback runtime is embedded, not referenced.
    assert!(content.contains("requestAnimationFrame"));
    assert!(!content.contains("src=\"http"));
}

#[test]
fn identical_scenes_export_identical_artifacts() {
    let exporter = Exporter::default();
    let a = exporter.export(&demo_scene(), "a.html");
    let b = exporter.export(&demo_scene(), "b.html");

    assert_eq!(a.content, b.content);
    assert_eq!(a.file_size, b.file_size);
    assert_eq!(a.scene_data_size, b.scene_data_size);
}

#[test]
fn size_accounting_partitions_the_artifact() {
    let out = Exporter::default().export(&demo_scene(), "x.html");
    assert!(out.success);
    assert_eq!(out.file_size, out.scene_data_size + out.assets_size);
    assert!(out.scene_data_size > 0);
    assert!(out.assets_size > 0);
}

#[test]
fn embedded_data_round_trips_through_the_model() {
    let out = Exporter::default().export(&demo_scene(), "x.html");
    let content = out.content.unwrap();

    // The scene data sits between the marker and the end of its line.
    let start = content.find("const SCENE = ").unwrap() + "const SCENE = ".len();
    let end = start + content[start..].find(";\n").unwrap();
    let data: ExportData = serde_json::from_str(&content[start..end]).unwrap();

    assert_eq!(data.objects.len(), 2);
    assert_eq!(data.animations.len(), 1);
    assert_eq!(data.animations[0].object_id, "dot");
    assert!(data.animations[0].looped);
    assert_eq!(data.timeline.duration, 2000.0);
}

#[test]
fn scene_strings_cannot_close_the_script_block() {
    let scene = JsonScene {
        payload: concat!(
            r#"{"objects": [{"id": "x", "type": "rect", "#,
            r#""style": {"fill": "</script><script>alert(1)"}}]}"#,
        )
        .to_owned(),
    };
    let out = Exporter::default().export(&scene, "x.html");
    assert!(out.success);

    let content = out.content.unwrap();
    // Only the artifact's own closing tag survives; the scene string is
    // embedded with `<` escaped.
    assert_eq!(content.matches("</script>").count(), 1);
    assert!(content.contains("\\u003c/script"));
}

#[test]
fn failed_serialization_reports_a_structured_failure() {
    let out = Exporter::default().export(&BrokenScene, "broken.html");
    assert!(!out.success);
    assert!(out.content.is_none());
    assert!(out.output_path.is_none());
    assert_eq!(out.file_size, 0);
    assert!(out.error.unwrap().contains("mid-mutation"));
}

#[test]
fn non_json_scene_data_reports_a_structured_failure() {
    let scene = JsonScene {
        payload: "not json at all".to_owned(),
    };
    let out = Exporter::default().export(&scene, "bad.html");
    assert!(!out.success);
    assert!(out.error.is_some());
}

#[test]
fn title_markup_is_escaped() {
    let exporter = Exporter::new(ExportOptions {
        title: "<script>alert(1)</script>".to_owned(),
    });
    let out = exporter.export(&demo_scene(), "x.html");
    let content = out.content.unwrap();
    assert!(!content.contains("<script>alert"));
    assert!(content.contains("&lt;script&gt;"));
}
