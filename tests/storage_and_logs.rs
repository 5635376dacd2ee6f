use std::fs;

use assert_matches::assert_matches;
use chrono::Local;
use subjective::config::{parse_config_file, ConfigParser, Entry, TextConfigParser, TrainingRange};
use subjective::grammar::Method;
use subjective::logger::{QuestionnaireLog, QuestionnairePhase, RatingLog};
use subjective::media::DirectoryLibrary;
use subjective::questionnaire::{Question, QuestionType, QuestionnaireAnswer};
use subjective::session::SessionState;
use subjective::settings::{Settings, StorageLayout};
use subjective::SessionError;
use tempfile::tempdir;

#[test]
fn two_ratings_and_a_break_make_four_lines() {
    let dir = tempdir().unwrap();
    let now = Local::now();
    let mut log = RatingLog::create(dir.path(), 5, Method::Dsis, &now).unwrap();
    log.log_rating(0, "a.mp4", 5, &now, Some(1.25)).unwrap();
    log.log_break().unwrap();
    log.log_rating(2, "b.mp4", 3, &now, Some(0.5)).unwrap();
    log.close().unwrap();

    let contents = fs::read_to_string(log.path()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("0,a.mp4,5,"));
    assert!(lines[1].ends_with(",1.250"));
    assert_eq!(lines[2], "-1,BREAK,,,");
    assert!(lines[3].ends_with(",0.500"));
    assert!(log.path().file_name().unwrap().to_string_lossy().ends_with("_DSIS.csv"));
}

#[test]
fn multiple_choice_answer_spans_rows() {
    let dir = tempdir().unwrap();
    let now = Local::now();
    let mut log = QuestionnaireLog::create(dir.path(), 5, QuestionnairePhase::Post, &now).unwrap();
    let question = Question::new("Devices, used daily", QuestionType::MultipleChoice, &["TV", "Phone"], true);
    let answer = QuestionnaireAnswer::multiple(vec!["TV".into(), "Phone".into()], now, 3.0);
    log.log_answer(1, &question, &answer).unwrap();

    let contents = fs::read_to_string(log.path()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("1,multiple-choice,\"Devices, used daily\",TV,"));
    assert!(lines[2].starts_with("1,multiple-choice,\"Devices, used daily\",Phone,"));
}

#[test]
fn missing_media_shifts_training_range() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("t1.mp4"), b"").unwrap();
    fs::write(dir.path().join("t2.mp4"), b"").unwrap();
    fs::write(dir.path().join("main.mp4"), b"").unwrap();

    let doc = TextConfigParser.parse_str(
        "subject_1.cfg",
        "missing.mp4\nTRAINING_START\nt1.mp4\nt2.mp4\nTRAINING_END\nmain.mp4\n",
    );
    assert_eq!(doc.training_range, Some(TrainingRange::new(1, 2)));

    let state = SessionState::from_document(&doc, 1, &DirectoryLibrary::new(dir.path())).unwrap();
    assert_eq!(state.training_range, Some(TrainingRange::new(0, 1)));
    assert_eq!(
        state.entries,
        vec![
            Entry::Video("t1.mp4".into()),
            Entry::Video("t2.mp4".into()),
            Entry::Video("main.mp4".into()),
        ]
    );
    assert_eq!(state.method, Method::AcrCategorical);
}

#[test]
fn session_setup_guards() {
    let dir = tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    layout.ensure_dirs().unwrap();
    let settings = Settings::default();

    assert_matches!(layout.resolve_config(1), Err(SessionError::ConfigNotFound { id: 1, .. }));

    fs::write(layout.config_dir().join("subject_1.json"), "[1, 2").unwrap();
    let doc = parse_config_file(&layout.resolve_config(1).unwrap());
    assert!(doc.fatal);
    let library = DirectoryLibrary::new(layout.media_dir());
    assert_matches!(
        SessionState::from_document(&doc, 1, &library),
        Err(SessionError::ConfigRejected { .. })
    );

    fs::write(layout.config_dir().join("subject_1.json"), r#"{"playlist":["gone.mp4"]}"#).unwrap();
    let doc = parse_config_file(&layout.resolve_config(1).unwrap());
    assert_matches!(
        SessionState::from_document(&doc, 1, &library),
        Err(SessionError::EmptyPlan(_))
    );

    let now = Local::now();
    RatingLog::create(&layout.logs_dir(), 1, Method::AcrCategorical, &now).unwrap();
    assert_matches!(
        layout.check_participant_id(1, &settings),
        Err(SessionError::ParticipantIdUsed(1))
    );
    assert!(layout.check_participant_id(11, &settings).is_ok());
}

#[test]
fn invalid_question_type_keeps_session_from_starting() {
    let dir = tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    layout.ensure_dirs().unwrap();
    fs::write(layout.media_dir().join("a.mp4"), b"").unwrap();
    fs::write(
        layout.config_dir().join("subject_4.json"),
        r#"{"playlist":["a.mp4"],"pre_questionnaire":[{"question":"Rate","type":"slider"}]}"#,
    )
    .unwrap();

    let doc = parse_config_file(&layout.resolve_config(4).unwrap());
    assert!(!doc.fatal);
    let library = DirectoryLibrary::new(layout.media_dir());
    assert_matches!(
        SessionState::from_document(&doc, 4, &library),
        Err(SessionError::ConfigRejected { errors, .. }) if errors.len() == 1
    );
}
