//! Built-in practice assessments, one per YLE level.

use chrono::{DateTime, Utc};

use services::{CatalogError, InMemoryCatalog};
use yle_core::model::{
    AnswerResponse, Assessment, AssessmentId, Question, QuestionContent, QuestionDraft,
    QuestionId, QuestionMetadata, QuestionType, SkillArea, YleLevel,
};

pub const DEFAULT_ASSESSMENT: &str = "starters-practice-001";

struct Item {
    id: &'static str,
    kind: QuestionType,
    skill: SkillArea,
    difficulty: u8,
    text: &'static str,
    instructions: &'static str,
    audio: Option<&'static str>,
    options: &'static [&'static str],
    answer: &'static str,
    points: u32,
    time_limit_secs: Option<u32>,
    tags: &'static [&'static str],
}

const STARTERS: &[Item] = &[
    Item {
        id: "starters-mc-001",
        kind: QuestionType::MultipleChoice,
        skill: SkillArea::Vocabulary,
        difficulty: 1,
        text: "What color is the sun?",
        instructions: "Choose the correct answer.",
        audio: None,
        options: &["Blue", "Yellow", "Green", "Purple"],
        answer: "Yellow",
        points: 1,
        time_limit_secs: None,
        tags: &["colors", "basic-vocabulary", "nature"],
    },
    Item {
        id: "starters-listening-001",
        kind: QuestionType::Listening,
        skill: SkillArea::Listening,
        difficulty: 2,
        text: "Listen to the sound and choose the correct animal.",
        instructions: "Play the sound, then choose the animal that makes it.",
        audio: Some("/audio/starters/dog-bark.mp3"),
        options: &["Cat", "Dog", "Bird", "Fish"],
        answer: "Dog",
        points: 2,
        time_limit_secs: Some(30),
        tags: &["animals", "sounds", "listening-skills"],
    },
    Item {
        id: "starters-reading-001",
        kind: QuestionType::Reading,
        skill: SkillArea::Reading,
        difficulty: 1,
        text: "My name is Sam. I am six years old. I like to play with my red ball.",
        instructions: "Read the text and answer: What does Sam like to play with?",
        audio: None,
        options: &["Blue ball", "Red ball", "Yellow ball", "Green ball"],
        answer: "Red ball",
        points: 2,
        time_limit_secs: None,
        tags: &["reading-comprehension", "basic-text", "toys"],
    },
];

const MOVERS: &[Item] = &[
    Item {
        id: "movers-mc-001",
        kind: QuestionType::MultipleChoice,
        skill: SkillArea::Grammar,
        difficulty: 3,
        text: "Yesterday, I _____ to the park with my friends.",
        instructions: "Choose the correct verb form to complete the sentence.",
        audio: None,
        options: &["go", "went", "going", "will go"],
        answer: "went",
        points: 2,
        time_limit_secs: None,
        tags: &["past-tense", "verbs", "grammar"],
    },
    Item {
        id: "movers-listening-001",
        kind: QuestionType::Listening,
        skill: SkillArea::Listening,
        difficulty: 3,
        text: "Listen to the conversation and answer the question.",
        instructions: "What time does the library close on Saturday?",
        audio: Some("/audio/movers/library-hours.mp3"),
        options: &["3:00 PM", "4:00 PM", "5:00 PM", "6:00 PM"],
        answer: "5:00 PM",
        points: 3,
        time_limit_secs: Some(45),
        tags: &["time", "public-places", "conversation"],
    },
    Item {
        id: "movers-fill-001",
        kind: QuestionType::FillInBlank,
        skill: SkillArea::Vocabulary,
        difficulty: 2,
        text: "A baby cat is called a _____.",
        instructions: "Type the missing word.",
        audio: None,
        options: &[],
        answer: "kitten",
        points: 2,
        time_limit_secs: None,
        tags: &["animals", "vocabulary"],
    },
];

const FLYERS: &[Item] = &[
    Item {
        id: "flyers-reading-001",
        kind: QuestionType::Reading,
        skill: SkillArea::Reading,
        difficulty: 4,
        text: "The ancient pyramids of Egypt were built over 4,000 years ago. These \
               magnificent structures were tombs for pharaohs and took many years to \
               complete. The largest pyramid, the Great Pyramid of Giza, was one of the \
               Seven Wonders of the Ancient World.",
        instructions: "According to the text, what were the pyramids used for?",
        audio: None,
        options: &[
            "Houses for people",
            "Tombs for pharaohs",
            "Storage for food",
            "Schools for children",
        ],
        answer: "Tombs for pharaohs",
        points: 3,
        time_limit_secs: None,
        tags: &["history", "ancient-civilizations", "reading-comprehension"],
    },
    Item {
        id: "flyers-grammar-001",
        kind: QuestionType::MultipleChoice,
        skill: SkillArea::Grammar,
        difficulty: 4,
        text: "If I _____ more time, I would learn to play the piano.",
        instructions: "Choose the correct form to complete the conditional sentence.",
        audio: None,
        options: &["have", "had", "will have", "would have"],
        answer: "had",
        points: 3,
        time_limit_secs: None,
        tags: &["conditionals", "advanced-grammar", "hypothetical-situations"],
    },
];

fn question(item: &Item, level: YleLevel, at: DateTime<Utc>) -> Result<Question, yle_core::Error> {
    let mut content =
        QuestionContent::new(item.text, item.instructions).with_options(item.options.iter().copied());
    if let Some(audio) = item.audio {
        content = content.with_audio(audio);
    }

    let draft = QuestionDraft {
        id: QuestionId::new(item.id),
        kind: item.kind,
        level,
        skill_area: item.skill,
        difficulty: item.difficulty,
        content,
        correct_answer: AnswerResponse::text(item.answer),
        points: item.points,
        time_limit_secs: item.time_limit_secs,
        metadata: QuestionMetadata::system(at).with_tags(item.tags.iter().copied()),
    };
    Ok(draft.validate()?)
}

#[allow(clippy::too_many_arguments)]
fn assessment(
    id: &str,
    title: &str,
    description: &str,
    level: YleLevel,
    items: &[Item],
    time_limit_minutes: u32,
    passing_score: u8,
    at: DateTime<Utc>,
) -> Result<Assessment, yle_core::Error> {
    let questions = items
        .iter()
        .map(|item| question(item, level, at))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Assessment::new(
        AssessmentId::new(id),
        title,
        description,
        level,
        questions,
        time_limit_minutes,
        passing_score,
        at,
    )?)
}

/// # Errors
///
/// Returns `CatalogError` if a built-in question fails validation.
pub fn built_in(at: DateTime<Utc>) -> Result<InMemoryCatalog, CatalogError> {
    let assessments = vec![
        assessment(
            DEFAULT_ASSESSMENT,
            "Starters Practice Test",
            "Basic vocabulary, simple listening, and reading comprehension.",
            YleLevel::Starters,
            STARTERS,
            30,
            70,
            at,
        )?,
        assessment(
            "movers-practice-001",
            "Movers Practice Test",
            "Grammar, listening comprehension, and vocabulary.",
            YleLevel::Movers,
            MOVERS,
            45,
            75,
            at,
        )?,
        assessment(
            "flyers-practice-001",
            "Flyers Practice Test",
            "Longer reading passages and advanced grammar.",
            YleLevel::Flyers,
            FLYERS,
            60,
            80,
            at,
        )?,
    ];
    InMemoryCatalog::new(assessments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::AssessmentProvider;
    use yle_core::time::fixed_now;

    #[test]
    fn every_level_has_one_assessment() {
        let catalog = built_in(fixed_now()).unwrap();
        for level in YleLevel::ALL {
            assert_eq!(catalog.by_level(level).len(), 1, "{level}");
        }

        let starters = catalog
            .assessment(&AssessmentId::new(DEFAULT_ASSESSMENT))
            .unwrap();
        assert_eq!(starters.time_limit_secs(), 1800);
        assert_eq!(starters.total_points(), 5);
    }
}
