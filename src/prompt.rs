//! Music prompt construction
//!
//! Maps profile dimensions to descriptive phrases and injects what the
//! feedback engine has learned into the instruction for the music director.

use anyhow::{Context, Result};

use crate::feedback::FeedbackEngine;
use crate::llm::TextGenerator;
use crate::types::EmotionalProfile;

/// Items shown per knowledge section
pub const SECTION_LIMIT: usize = 3;

pub fn describe_energy(value: u8) -> &'static str {
    match value {
        0..=20 => "quiet, minimal, ambient, whisper-soft, ~60 BPM",
        21..=40 => "gentle, relaxed, easy-going, mellow, ~80 BPM",
        41..=60 => "moderate energy, steady, flowing, ~100 BPM",
        61..=80 => "energetic, driving, powerful, upbeat, ~120 BPM",
        _ => "intense, explosive, soaring, maximum energy, ~140 BPM",
    }
}

pub fn describe_style(value: u8) -> &'static str {
    match value {
        0..=20 => "minimal, sparse, solo instrument, intimate bedroom recording",
        21..=40 => "indie pop, clean guitar, light drums, warm synth pads",
        41..=60 => "polished pop-rock, piano and strings, balanced mix, studio quality",
        61..=80 => "cinematic, orchestral swell, wide stereo, dramatic full strings",
        _ => "epic orchestral, massive choir, soaring brass, blockbuster soundtrack",
    }
}

pub fn describe_warmth(value: u8) -> &'static str {
    match value {
        0..=20 => "deep bass, rich low-end, dark and moody tone",
        21..=40 => "warm, smooth, round tone, gentle reverb",
        41..=60 => "natural, balanced tone, clear and open",
        61..=80 => "bright, crisp, shimmering, airy highs",
        _ => "crystalline, sparkling, ultra-bright, electronic sheen",
    }
}

pub fn describe_arc(value: u8) -> &'static str {
    match value {
        0..=20 => "steady, unchanging, ambient loop, constant, flat dynamics",
        21..=40 => "gentle variation, subtle breathing, light swell",
        41..=60 => "evolving, verse-chorus, moderate build",
        61..=80 => "building, rising intensity, crescendo, climax",
        _ => "starts quiet, massive build, explosive climax, drop",
    }
}

fn push_section(sections: &mut Vec<String>, heading: String, items: &[String], quoted: bool) {
    if items.is_empty() {
        return;
    }
    let lines: Vec<String> = items
        .iter()
        .take(SECTION_LIMIT)
        .map(|item| if quoted { format!("- \"{}\"", item) } else { format!("- {}", item) })
        .collect();
    sections.push(format!("{}\n{}", heading, lines.join("\n")));
}

/// Learned knowledge for `emotion`, empty when nothing has been learned yet
pub async fn build_knowledge_context(engine: &FeedbackEngine, emotion: &str) -> Result<String> {
    let mut sections = Vec::new();

    let top = engine.top_examples(emotion, SECTION_LIMIT).await?;
    push_section(
        &mut sections,
        "Prompts that scored well for this emotion, use as inspiration:".to_string(),
        &top,
        true,
    );

    let bottom = engine.bottom_examples(emotion, SECTION_LIMIT).await?;
    push_section(
        &mut sections,
        "Prompts that scored POORLY, AVOID these patterns:".to_string(),
        &bottom,
        true,
    );

    if let Some(profile) = engine.profile_for(emotion).await {
        push_section(
            &mut sections,
            format!("Learned principles for \"{}\":", emotion),
            &profile.prompt_principles,
            false,
        );
        push_section(
            &mut sections,
            format!("Anti-patterns for \"{}\" (avoid these):", emotion),
            &profile.anti_patterns,
            false,
        );
    }

    let rules = engine.current_rules().await;
    push_section(
        &mut sections,
        "General rules for good music prompts:".to_string(),
        &rules.global_rules.positive,
        false,
    );
    push_section(
        &mut sections,
        "General patterns to avoid:".to_string(),
        &rules.global_rules.negative,
        false,
    );

    Ok(sections.join("\n\n"))
}

/// Instruction asking the text generator for a music generation prompt
pub fn music_director_prompt(profile: &EmotionalProfile, knowledge: &str) -> String {
    let knowledge_block = if knowledge.is_empty() {
        String::new()
    } else {
        format!("\n{}\n", knowledge)
    };

    format!(
        r#"You are a music director creating a prompt for an AI music generator.

Given this emotional profile:
- Emotion: {emotion}
- Energy: {energy}/100 -> {energy_desc}
- Style: {style}/100 -> {style_desc}
- Warmth: {warmth}/100 -> {warmth_desc}
- Arc: {arc}/100 -> {arc_desc}
{knowledge_block}
Write a vivid 2-3 sentence music generation prompt that blends ALL of these qualities naturally. Include specific instruments, tempo feel, production style, and structural arc.

The listener's dominant emotion is "{emotion}", the music should honor that feeling.

Output ONLY the prompt text. No labels, no JSON, no explanation."#,
        emotion = profile.emotion,
        energy = profile.energy,
        energy_desc = describe_energy(profile.energy),
        style = profile.style,
        style_desc = describe_style(profile.style),
        warmth = profile.warmth,
        warmth_desc = describe_warmth(profile.warmth),
        arc = profile.arc,
        arc_desc = describe_arc(profile.arc),
        knowledge_block = knowledge_block,
    )
}

/// Write the music generation prompt for `profile`
pub async fn create_music_prompt(
    generator: &dyn TextGenerator,
    engine: &FeedbackEngine,
    profile: &EmotionalProfile,
) -> Result<String> {
    let knowledge = build_knowledge_context(engine, &profile.emotion).await?;
    let instruction = music_director_prompt(profile, &knowledge);
    let reply = generator
        .generate(&instruction)
        .await
        .context("Music prompt request failed")?;
    Ok(reply.trim().trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReflectionConfig;
    use crate::feedback::entry::fixtures::feedback;
    use crate::llm::MockTextGenerator;
    use std::sync::Arc;

    async fn engine_with(dir: &std::path::Path) -> FeedbackEngine {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().times(0);
        FeedbackEngine::open(dir.join("fb.db"), &ReflectionConfig::default(), Arc::new(mock))
            .await
            .unwrap()
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(describe_energy(20), describe_energy(0));
        assert_ne!(describe_energy(20), describe_energy(21));
        assert_eq!(describe_style(60), describe_style(41));
        assert_ne!(describe_warmth(80), describe_warmth(81));
        assert!(describe_arc(100).contains("explosive"));
    }

    #[test]
    fn test_director_prompt_without_knowledge() {
        let mut profile = EmotionalProfile::neutral("hopeful");
        profile.energy = 75;
        let prompt = music_director_prompt(&profile, "");

        assert!(prompt.contains("- Emotion: hopeful"));
        assert!(prompt.contains("Energy: 75/100 -> energetic"));
        assert!(!prompt.contains("\n\n\n"));
    }

    #[tokio::test]
    async fn test_knowledge_context_empty_without_history() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path()).await;
        assert_eq!(build_knowledge_context(&engine, "calm").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_knowledge_context_omits_empty_sections() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path()).await;
        for (rating, prompt) in [(5, "soft rain piano"), (4, "lofi beat"), (5, "cello drone"), (5, "harp")] {
            engine.submit(feedback("calm", rating, prompt)).await.unwrap();
        }

        let context = build_knowledge_context(&engine, "Calm").await.unwrap();
        assert!(context.starts_with("Prompts that scored well"));
        assert!(context.contains("- \"harp\""));
        assert!(context.contains("Prompts that scored POORLY"));
        assert_eq!(context.matches("\n- ").count(), 6);
        assert!(!context.contains("Learned principles"));
        assert!(!context.contains("General rules"));
    }

    #[tokio::test]
    async fn test_create_music_prompt_trims_reply() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path()).await;
        let mut director = MockTextGenerator::new();
        director
            .expect_generate()
            .withf(|instruction: &str| instruction.contains("Emotion: calm"))
            .times(1)
            .returning(|_| Ok("  \"Slow piano over soft rain.\"\n".to_string()));

        let prompt = create_music_prompt(&director, &engine, &EmotionalProfile::neutral("calm"))
            .await
            .unwrap();
        assert_eq!(prompt, "Slow piano over soft rain.");
    }
}
