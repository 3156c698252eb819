use std::time::Instant;

use kokoro_nodes::nodes::{register_nodes, NodeInputs, NodeRegistry, NodeValue};
use kokoro_nodes::{SaveAudioNode, TextToSpeechNode, TtsConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = TtsConfig::from_env();
    let mut registry = NodeRegistry::new();
    register_nodes(&mut registry, &config);
    println!("Registered nodes: {:?}", registry.class_names());

    let text = std::env::args().nth(1).unwrap_or_else(|| {
        "Hello! This is Kokoro, a text to speech model with multilingual support.\n\
         Each line is rendered on its own and joined into one clip."
            .to_string()
    });

    let synth_start = Instant::now();
    let outputs = registry.execute(
        TextToSpeechNode::CLASS_NAME,
        NodeInputs::new()
            .with("text", NodeValue::Text(text))
            .with("voice", NodeValue::Text("American Female 1".to_string())),
    )?;
    let synth_dur = synth_start.elapsed();

    let Some(NodeValue::Audio(audio)) = outputs.into_iter().next() else {
        return Err("TTS node returned no audio".into());
    };
    let audio_duration = audio.duration_secs();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        audio_duration,
        synth_dur,
        audio_duration / synth_dur.as_secs_f64()
    );

    let outputs = registry.execute(
        SaveAudioNode::CLASS_NAME,
        NodeInputs::new()
            .with("audio", NodeValue::Audio(audio))
            .with("format", NodeValue::Text("wav".to_string())),
    )?;
    if let Some(NodeValue::Text(path)) = outputs.first() {
        println!("Saved to {path}");
    }

    Ok(())
}
