#![cfg(unix)]

use fanout_annotator::annotators::{
    AnnotateError, Annotator, AnnotatorFactory, CommandAnnotatorFactory, Device,
};
use fanout_annotator::config::PipelineConfig;
use fanout_annotator::pipeline::{Item, MetadataRecord, Pipeline};
use std::collections::BTreeMap;
use std::path::PathBuf;

const SCRIPT: &str = r#"
while IFS= read -r path; do
  case "$path" in
    *unreadable*) printf '{"error":"cannot decode image","unreadable":true}\n' ;;
    *fail*) printf '{"error":"inference error"}\n' ;;
    *noisy*) printf 'loading model weights\n{"text":"after noise"}\n' ;;
    *echo*) printf '{"item":"%s","text":"echoed"}\n' "$path" ;;
    *wrong*) printf '{"item":"/data/other.png","text":"misplaced"}\n' ;;
    *exit*) exit 0 ;;
    *device*) printf '{"text":"%s|%s"}\n' "$ANNOTATE_DEVICE" "$CUDA_VISIBLE_DEVICES" ;;
    *model*) printf '{"text":"%s"}\n' "$ANNOTATE_MODEL_WD" ;;
    *) printf '{"text":"tags for %s "}\n' "$(basename "$path")" ;;
  esac
done
"#;

fn factory() -> CommandAnnotatorFactory {
    CommandAnnotatorFactory::new("sh", vec!["-c".to_string(), SCRIPT.to_string()])
}

#[test]
fn test_reply_kinds() {
    let mut annotator = factory().load(Device::Cpu).unwrap();

    assert_eq!(
        annotator.annotate(&Item::from("/data/cat.png")),
        Ok("tags for cat.png".to_string())
    );
    assert_eq!(
        annotator.annotate(&Item::from("/data/unreadable.png")),
        Err(AnnotateError::Unreadable("cannot decode image".to_string()))
    );
    assert_eq!(
        annotator.annotate(&Item::from("/data/fail.png")),
        Err(AnnotateError::Inference("inference error".to_string()))
    );
    // Stray output from the child is not taken as a reply
    assert_eq!(
        annotator.annotate(&Item::from("/data/noisy.png")),
        Ok("after noise".to_string())
    );
    // The child survives item-level errors
    assert_eq!(
        annotator.annotate(&Item::from("/data/dog.png")),
        Ok("tags for dog.png".to_string())
    );
}

#[test]
fn test_banner_before_first_reply_keeps_replies_aligned() {
    let script = r#"
echo "loading model weights"
while IFS= read -r path; do
  echo "warming up"
  printf '{"text":"tags for %s"}\n' "$(basename "$path")"
done
"#;
    let factory = CommandAnnotatorFactory::new("sh", vec!["-c".to_string(), script.to_string()]);
    let mut annotator = factory.load(Device::Cpu).unwrap();

    for name in ["a.png", "b.png", "c.png"] {
        assert_eq!(
            annotator.annotate(&Item::from(format!("/d/{}", name).as_str())),
            Ok(format!("tags for {}", name))
        );
    }
}

#[test]
fn test_echoed_item_must_match() {
    let mut annotator = factory().load(Device::Cpu).unwrap();
    assert_eq!(
        annotator.annotate(&Item::from("/data/echo.png")),
        Ok("echoed".to_string())
    );
    assert!(matches!(
        annotator.annotate(&Item::from("/data/wrong.png")),
        Err(AnnotateError::Fatal(_))
    ));
}

#[test]
fn test_device_environment() {
    let mut gpu = factory().load(Device::Gpu(1)).unwrap();
    assert_eq!(
        gpu.annotate(&Item::from("device.png")),
        Ok("cuda:1|1".to_string())
    );

    let mut cpu = factory().load(Device::Cpu).unwrap();
    assert_eq!(cpu.annotate(&Item::from("device.png")), Ok("cpu|".to_string()));
}

#[test]
fn test_artifacts_are_exported() {
    let mut artifacts = BTreeMap::new();
    artifacts.insert("wd".to_string(), PathBuf::from("/store/wd.onnx"));
    let mut annotator = factory()
        .with_artifacts(&artifacts)
        .load(Device::Cpu)
        .unwrap();

    assert_eq!(
        annotator.annotate(&Item::from("model.png")),
        Ok("/store/wd.onnx".to_string())
    );
}

#[test]
fn test_exited_child_is_fatal() {
    let mut annotator = factory().load(Device::Cpu).unwrap();
    assert!(matches!(
        annotator.annotate(&Item::from("exit.png")),
        Err(AnnotateError::Fatal(_))
    ));
    assert!(matches!(
        annotator.annotate(&Item::from("after.png")),
        Err(AnnotateError::Fatal(_))
    ));
}

#[test]
fn test_missing_program_fails_to_load() {
    let factory = CommandAnnotatorFactory::new("/nonexistent/annotator-binary", Vec::new());
    assert!(factory.load(Device::Cpu).is_err());
}

#[tokio::test]
async fn test_pipeline_with_child_processes() {
    let config = PipelineConfig {
        root: "/data".into(),
        parallelism: Some(2),
        devices: vec![Device::Gpu(0), Device::Gpu(1)],
        show_progress: false,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, factory()).unwrap();
    let input = vec![
        Item::from("/data/a.png"),
        Item::from("/data/unreadable.png"),
        Item::from("/data/b.png"),
        Item::from("/data/c.png"),
    ];

    let (output, summary) = pipeline.run_with_sink(input, Vec::new()).await.unwrap();

    let mut records: Vec<MetadataRecord> = std::str::from_utf8(&output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    records.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    let names: Vec<&str> = records.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    assert_eq!(records[0].text, "tags for a.png");

    assert_eq!(summary.annotated, 3);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.lost_workers, 0);
}

#[tokio::test]
async fn test_crashing_child_fails_rest_of_partition() {
    let config = PipelineConfig {
        root: "/data".into(),
        parallelism: Some(1),
        show_progress: false,
        ..Default::default()
    };
    let pipeline = Pipeline::new(config, factory()).unwrap();
    let input = vec![
        Item::from("/data/a.png"),
        Item::from("/data/exit.png"),
        Item::from("/data/b.png"),
    ];

    let (_, summary) = pipeline.run_with_sink(input, Vec::new()).await.unwrap();
    assert_eq!(summary.annotated, 1);
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(summary.unaccounted(), 0);
    assert_eq!(summary.lost_workers, 0);
}
