//! Interactive question loop for the `take` command.

use std::error::Error;
use std::io::Write;

use chrono::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use services::{SessionError, SessionManager};
use yle_core::grading::{AssessmentResult, grade_session};
use yle_core::model::{AnswerResponse, Assessment, Question, QuestionType, TestSession};

/// How the loop ended.
#[derive(Debug)]
pub enum Outcome {
    Finished(AssessmentResult),
    Paused,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Next,
    Prev,
    Goto(usize),
    Pause,
    Finish,
    Quit,
    Answer(String),
}

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let Some(command) = line.strip_prefix(':') else {
        if line.is_empty() {
            return Err("Type an answer, or :next :prev :goto <n> :pause :finish :quit".into());
        }
        return Ok(Input::Answer(line.to_owned()));
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("next"), None) => Ok(Input::Next),
        (Some("prev"), None) => Ok(Input::Prev),
        (Some("pause"), None) => Ok(Input::Pause),
        (Some("finish"), None) => Ok(Input::Finish),
        (Some("quit"), None) => Ok(Input::Quit),
        (Some("goto"), Some(raw)) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Input::Goto(n - 1)),
            _ => Err(format!("invalid question number: {raw}")),
        },
        _ => Err(format!("unknown command: :{command}")),
    }
}

/// Option numbers pick the option text; drag-drop answers are comma separated.
/// Numeric input that is NaN or infinite is kept as text.
fn parse_answer(question: &Question, raw: &str) -> AnswerResponse {
    let options = &question.content().options;
    if let Ok(n) = raw.parse::<usize>() {
        if let Some(option) = n.checked_sub(1).and_then(|i| options.get(i)) {
            return AnswerResponse::text(option.as_str());
        }
    }

    match (question.kind(), question.correct_answer()) {
        (QuestionType::DragDrop, _) => AnswerResponse::parts(raw.split(',').map(str::trim)),
        (_, AnswerResponse::Number(_)) => raw
            .parse::<f64>()
            .ok()
            .and_then(AnswerResponse::number)
            .unwrap_or_else(|| AnswerResponse::text(raw)),
        _ => AnswerResponse::text(raw),
    }
}

fn format_clock(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn render<W: Write>(
    manager: &SessionManager,
    assessment: &Assessment,
    out: &mut W,
) -> std::io::Result<()> {
    let Some(session) = manager.session() else {
        return Ok(());
    };
    let total = assessment.question_count();
    let index = session.current_question_index();

    writeln!(out)?;
    let Some(question) = assessment.question(index) else {
        writeln!(
            out,
            "No question {} in this test. Use :goto <n> or :finish.",
            index + 1
        )?;
        return Ok(());
    };

    writeln!(
        out,
        "Question {}/{}  [{} | {} pt]  {} left  {}% answered",
        index + 1,
        total,
        question.kind(),
        question.points(),
        format_clock(session.time_remaining()),
        manager.progress_percentage(total),
    )?;
    let content = question.content();
    writeln!(out, "{}", content.text)?;
    writeln!(out, "{}", content.instructions)?;
    if let Some(audio) = &content.audio_url {
        writeln!(out, "(audio: {audio})")?;
    }
    for (i, option) in content.options.iter().enumerate() {
        writeln!(out, "  {}. {option}", i + 1)?;
    }
    if let Some(previous) = session.answer_for(question.id()) {
        writeln!(
            out,
            "Your answer: {} (attempt {})",
            describe(&previous.response),
            previous.attempts
        )?;
    }
    Ok(())
}

fn describe(response: &AnswerResponse) -> String {
    match response {
        AnswerResponse::Text(text) => text.clone(),
        AnswerResponse::Parts(parts) => parts.join(", "),
        AnswerResponse::Number(n) => n.to_string(),
    }
}

/// Print a recoverable navigation failure; anything else is fatal.
fn report<T, W: Write>(
    result: Result<T, SessionError>,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    match result {
        Ok(_) => Ok(()),
        Err(SessionError::State(err)) => {
            writeln!(out, "{err}")?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn print_result<W: Write>(result: &AssessmentResult, out: &mut W) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "Score: {}/{} ({}%) - {}",
        result.total_score,
        result.max_score,
        result.percentage,
        if result.passed { "passed" } else { "not passed" }
    )?;
    for skill in &result.skill_breakdown {
        writeln!(
            out,
            "  {:?}: {}/{} ({}%)",
            skill.skill, skill.score, skill.max_score, skill.percentage
        )?;
    }
    if let Some(secs) = result.completion_secs {
        let secs = u32::try_from(secs).unwrap_or(u32::MAX);
        writeln!(out, "Time taken: {}", format_clock(secs))?;
    }
    Ok(())
}

async fn finish<W: Write>(
    manager: &mut SessionManager,
    assessment: &Assessment,
    out: &mut W,
) -> Result<Outcome, Box<dyn Error>> {
    manager.complete_session().await?;
    let session = manager.session().ok_or(SessionError::NoActiveSession)?;
    let result = grade_session(session, assessment)?;
    print_result(&result, out)?;
    Ok(Outcome::Finished(result))
}

/// Drive an in-progress session from `input` until it is finished, paused, or left.
///
/// Remaining time is charged from the manager's clock after every line.
///
/// # Errors
///
/// Returns an error on I/O failure or when the session cannot be persisted.
pub async fn take<R, W>(
    manager: &mut SessionManager,
    assessment: &Assessment,
    input: R,
    out: &mut W,
) -> Result<Outcome, Box<dyn Error>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let total = assessment.question_count();
    let mut lines = input.lines();
    let clock = manager.clock();
    let mut last_tick = clock.now();
    let mut shown_at = last_tick;

    render(manager, assessment, out)?;
    loop {
        let Some(line) = lines.next_line().await? else {
            manager.pause_session().await?;
            writeln!(out, "Input closed; session paused.")?;
            return Ok(Outcome::Paused);
        };

        let now = clock.now();
        let elapsed = clock.elapsed_secs(last_tick);
        last_tick += Duration::seconds(elapsed);
        if elapsed > 0 {
            let remaining = manager.session().map_or(0, TestSession::time_remaining);
            manager
                .update_time_remaining(i64::from(remaining) - elapsed)
                .await?;
        }
        if manager.is_session_expired() {
            writeln!(out, "Time is up.")?;
            return finish(manager, assessment, out).await;
        }

        match parse_input(&line) {
            Err(message) => writeln!(out, "{message}")?,
            Ok(Input::Next) => report(manager.next_question_within(total).await, out)?,
            Ok(Input::Prev) => report(manager.previous_question().await, out)?,
            Ok(Input::Goto(index)) => {
                report(manager.go_to_question_within(index, total).await, out)?;
            }
            Ok(Input::Pause) => {
                manager.pause_session().await?;
                writeln!(out, "Paused. Run `take` again to resume.")?;
                return Ok(Outcome::Paused);
            }
            Ok(Input::Finish) => return finish(manager, assessment, out).await,
            Ok(Input::Quit) => {
                writeln!(out, "Left the test; it stays in progress.")?;
                return Ok(Outcome::Left);
            }
            Ok(Input::Answer(raw)) => {
                let index = manager
                    .session()
                    .map_or(0, TestSession::current_question_index);
                if let Some(question) = assessment.question(index) {
                    let spent = u32::try_from(clock.elapsed_secs(shown_at)).unwrap_or(u32::MAX);
                    let response = parse_answer(question, &raw);
                    if response.is_blank() {
                        writeln!(out, "Empty answer; nothing saved.")?;
                        continue;
                    }
                    debug!(question_id = %question.id(), "answer entered");
                    manager
                        .save_answer(question.id().clone(), response, spent)
                        .await?;
                    if index + 1 < total {
                        manager.next_question().await?;
                    } else {
                        writeln!(out, "That was the last question. Type :finish to submit.")?;
                    }
                } else {
                    writeln!(out, "No question here. Use :goto <n> or :finish.")?;
                }
            }
        }

        shown_at = now;
        render(manager, assessment, out)?;
    }
}
