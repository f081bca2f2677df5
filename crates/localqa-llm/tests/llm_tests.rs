use std::fs;

use candle_core::Device;
use localqa_core::config::LlmSettings;
use localqa_core::Error;
use localqa_llm::QuantizedLlama;

fn settings_for(model: &std::path::Path, tokenizer: &std::path::Path) -> LlmSettings {
    LlmSettings {
        model_path: model.to_string_lossy().to_string(),
        tokenizer_path: tokenizer.to_string_lossy().to_string(),
        ..LlmSettings::default()
    }
}

fn failing_path(err: &anyhow::Error) -> std::path::PathBuf {
    match err.downcast_ref::<Error>() {
        Some(Error::LanguageModel { path, .. }) => path.clone(),
        other => panic!("expected a language model error, got {other:?}"),
    }
}

#[test]
fn missing_model_file_names_the_path() {
    let tmp = tempfile::tempdir().unwrap();
    let model = tmp.path().join("missing.gguf");
    let tokenizer = tmp.path().join("tokenizer.json");
    fs::write(&tokenizer, "{}").unwrap();

    let err = QuantizedLlama::load(&settings_for(&model, &tokenizer), &Device::Cpu).err().expect("must fail");
    assert_eq!(failing_path(&err), model);
    assert!(err.to_string().contains("missing.gguf"));
}

#[test]
fn missing_tokenizer_names_the_path() {
    let tmp = tempfile::tempdir().unwrap();
    let model = tmp.path().join("model.gguf");
    fs::write(&model, b"GGUF").unwrap();
    let tokenizer = tmp.path().join("no-tokenizer.json");

    let err = QuantizedLlama::load(&settings_for(&model, &tokenizer), &Device::Cpu).err().expect("must fail");
    assert_eq!(failing_path(&err), tokenizer);
}

#[test]
fn corrupt_model_file_is_a_language_model_error() {
    let tmp = tempfile::tempdir().unwrap();
    let model = tmp.path().join("broken.gguf");
    fs::write(&model, b"definitely not a gguf file").unwrap();
    let tokenizer = tmp.path().join("tokenizer.json");
    fs::write(&tokenizer, "{}").unwrap();

    let err = QuantizedLlama::load(&settings_for(&model, &tokenizer), &Device::Cpu).err().expect("must fail");
    assert_eq!(failing_path(&err), model);
}
