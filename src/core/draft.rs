use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::warn;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

use crate::cache::{CacheKey, QueryCache};
use crate::core::services::response::missing_required;
use crate::error::Error;
use crate::models::form::Form;
use crate::models::response::{AnswerMap, AnswerValue, Response};

/// Idle period after the last edit before a draft is auto-saved.
pub const AUTOSAVE_IDLE: Duration = Duration::from_secs(2);

/// Transport seam between the draft controller and the server. The
/// production implementation is [`crate::client::PgResponseApi`].
pub trait ResponseApi {
    async fn save_draft(&self, form_id: i32, answers: &AnswerMap) -> Result<Response, Error>;
    async fn submit(&self, form_id: i32, answers: &AnswerMap) -> Result<Response, Error>;
    async fn update(&self, response_id: i32, answers: &AnswerMap, is_draft: bool) -> Result<Response, Error>;
    async fn my_draft(&self, form_id: i32) -> Result<Option<Response>, Error>;
    async fn response(&self, response_id: i32) -> Result<Response, Error>;
}

enum Command {
    UpdateAnswer { question_id: String, value: AnswerValue },
    Save { reply: oneshot::Sender<Result<(), Error>> },
    Submit { reply: oneshot::Sender<Result<Response, Error>> },
    Update { reply: oneshot::Sender<Result<Response, Error>> },
    Clear,
    Load { reply: oneshot::Sender<Result<(), Error>> },
    Snapshot { reply: oneshot::Sender<DraftSnapshot> },
}

#[derive(Debug, Clone)]
pub struct DraftSnapshot {
    pub answers: AnswerMap,
    pub last_saved: Option<DateTime<Utc>>,
    pub is_cleared: bool,
}

/// Handle to a running [`DraftController`]. Dropping the last handle stops
/// the controller after one final flush of any pending auto-save.
#[derive(Clone)]
pub struct DraftHandle {
    tx: mpsc::Sender<Command>,
}

impl DraftHandle {
    pub async fn update_answer(&self, question_id: impl Into<String>, value: AnswerValue) {
        let _ = self
            .tx
            .send(Command::UpdateAnswer {
                question_id: question_id.into(),
                value,
            })
            .await;
    }

    pub async fn save(&self) -> Result<(), Error> {
        self.request(|reply| Command::Save { reply }).await?
    }

    pub async fn submit(&self) -> Result<Response, Error> {
        self.request(|reply| Command::Submit { reply }).await?
    }

    pub async fn update(&self) -> Result<Response, Error> {
        self.request(|reply| Command::Update { reply }).await?
    }

    pub async fn clear(&self) {
        let _ = self.tx.send(Command::Clear).await;
    }

    pub async fn load(&self) -> Result<(), Error> {
        self.request(|reply| Command::Load { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<DraftSnapshot, Error> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| Error::Server("draft controller stopped".into()))?;
        rx.await.map_err(|_| Error::Server("draft controller stopped".into()))
    }
}

/// One user's in-progress answers for one form. All mutations and the
/// auto-save timer run through a single `select!` loop, so a submit that
/// lands inside the debounce window is ordered strictly before (and
/// cancels) the pending auto-save.
pub struct DraftController<A> {
    form: Form,
    edit_response_id: Option<i32>,
    api: A,
    cache: Arc<QueryCache<Response>>,
    answers: AnswerMap,
    last_saved: Option<DateTime<Utc>>,
    is_cleared: bool,
    autosave_at: Option<Instant>,
    commands: mpsc::Receiver<Command>,
}

impl<A: ResponseApi> DraftController<A> {
    pub fn new(form: Form, edit_response_id: Option<i32>, api: A, cache: Arc<QueryCache<Response>>) -> (DraftHandle, Self) {
        let (tx, commands) = mpsc::channel(16);
        let controller = Self {
            form,
            edit_response_id,
            api,
            cache,
            answers: AnswerMap::new(),
            last_saved: None,
            is_cleared: false,
            autosave_at: None,
            commands,
        };
        (DraftHandle { tx }, controller)
    }

    pub async fn run(mut self) {
        loop {
            let deadline = self.autosave_at;
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        if self.autosave_at.take().is_some() {
                            self.autosave().await;
                        }
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.autosave_at = None;
                    self.autosave().await;
                }
            }
        }
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::UpdateAnswer { question_id, value } => {
                self.answers.insert(question_id, value);
                self.is_cleared = false;
                self.autosave_at = Some(Instant::now() + AUTOSAVE_IDLE);
            }
            Command::Save { reply } => {
                self.autosave_at = None;
                let result = self.flush_draft().await.map(|_| ());
                let _ = reply.send(result);
            }
            Command::Submit { reply } => {
                let _ = reply.send(self.submit().await);
            }
            Command::Update { reply } => {
                let _ = reply.send(self.update_existing().await);
            }
            Command::Clear => self.clear(),
            Command::Load { reply } => {
                let _ = reply.send(self.load().await);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(DraftSnapshot {
                    answers: self.answers.clone(),
                    last_saved: self.last_saved,
                    is_cleared: self.is_cleared,
                });
            }
        }
    }

    /// Debounced write. Failures stay out of the user's way while typing.
    async fn autosave(&mut self) {
        if self.answers.is_empty() {
            return;
        }
        if let Err(err) = self.flush_draft().await {
            warn!("auto-save for form {} failed: {err}", self.form.id);
        }
    }

    async fn flush_draft(&mut self) -> Result<Response, Error> {
        let saved = match self.edit_response_id {
            Some(id) => {
                let saved = self.api.update(id, &self.answers, true).await?;
                self.cache.put(CacheKey::Response { response_id: id }, saved.clone());
                saved
            }
            None => {
                let saved = self.api.save_draft(self.form.id, &self.answers).await?;
                self.cache.put(CacheKey::MyDraft { form_id: self.form.id }, saved.clone());
                saved
            }
        };
        self.last_saved = Some(Utc::now());
        Ok(saved)
    }

    fn check_required(&self) -> Result<(), Error> {
        let missing = missing_required(&self.form.questions, &self.answers);
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::Validation(format!(
            "please answer: {}",
            missing.iter().map(|q| q.title.as_str()).join(", ")
        )))
    }

    async fn submit(&mut self) -> Result<Response, Error> {
        if self.edit_response_id.is_some() {
            return Err(Error::Validation("editing an existing response; use update instead".into()));
        }
        self.check_required()?;
        // supersedes any auto-save still waiting on the idle timer
        self.autosave_at = None;
        let submitted = self.api.submit(self.form.id, &self.answers).await?;
        self.answers.clear();
        self.last_saved = None;
        self.cache.evict(&CacheKey::MyDraft { form_id: self.form.id });
        self.cache.invalidate(&CacheKey::FormResponses { form_id: self.form.id });
        Ok(submitted)
    }

    async fn update_existing(&mut self) -> Result<Response, Error> {
        let id = self
            .edit_response_id
            .ok_or_else(|| Error::Validation("no response is being edited".into()))?;
        self.check_required()?;
        self.autosave_at = None;
        let updated = self.api.update(id, &self.answers, false).await?;
        self.last_saved = Some(Utc::now());
        self.cache.put(CacheKey::Response { response_id: id }, updated.clone());
        self.cache.invalidate(&CacheKey::FormResponses { form_id: self.form.id });
        Ok(updated)
    }

    fn clear(&mut self) {
        self.answers.clear();
        self.last_saved = None;
        self.is_cleared = true;
        self.autosave_at = None;
        self.cache.evict(&CacheKey::MyDraft { form_id: self.form.id });
        if let Some(id) = self.edit_response_id {
            self.cache.evict(&CacheKey::Response { response_id: id });
        }
    }

    async fn load(&mut self) -> Result<(), Error> {
        let fetched = match self.edit_response_id {
            Some(id) => {
                let key = CacheKey::Response { response_id: id };
                match self.cache.get_fresh(&key) {
                    Some(hit) => Some(hit),
                    None => {
                        let row = self.api.response(id).await?;
                        self.cache.put(key, row.clone());
                        Some(row)
                    }
                }
            }
            None => {
                let key = CacheKey::MyDraft { form_id: self.form.id };
                match self.cache.get_fresh(&key) {
                    Some(hit) => Some(hit),
                    None => {
                        let row = self.api.my_draft(self.form.id).await?;
                        if let Some(row) = &row {
                            self.cache.put(key, row.clone());
                        }
                        row
                    }
                }
            }
        };
        // a refetch finishing after the user cleared must not repopulate
        // the form until they edit again
        if self.is_cleared {
            return Ok(());
        }
        if let Some(row) = fetched {
            self.last_saved = Some(row.submitted_at);
            self.answers = row.answers;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::form::{Question, QuestionType, Recurrence, MAX_RATING_SCALE};
    use chrono::TimeZone;
    use std::sync::Mutex;

    const FORM: i32 = 7;

    fn test_form() -> Form {
        let questions = vec![
            Question {
                id: "mood".into(),
                title: "How are you feeling?".into(),
                kind: QuestionType::Rating,
                required: true,
                choices: vec![],
                multiple: false,
                scale: MAX_RATING_SCALE,
            },
            Question {
                id: "highlight".into(),
                title: "Highlight of the week".into(),
                kind: QuestionType::Text,
                required: false,
                choices: vec![],
                multiple: false,
                scale: MAX_RATING_SCALE,
            },
        ];
        Form {
            id: FORM,
            space_id: 3,
            title: "Weekly check-in".into(),
            recurrence: Recurrence::Weekly,
            questions,
            created_by: 1,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn row(id: i32, answers: AnswerMap, is_draft: bool) -> Response {
        Response {
            id,
            form_id: FORM,
            user_id: 2,
            answers,
            is_draft,
            submitted_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[derive(Default)]
    struct MockState {
        draft_saves: Vec<AnswerMap>,
        submits: Vec<AnswerMap>,
        updates: Vec<(i32, AnswerMap, bool)>,
        my_draft: Option<Response>,
        next_id: i32,
    }

    #[derive(Clone, Default)]
    struct MockApi {
        state: Arc<Mutex<MockState>>,
    }

    impl MockApi {
        fn with_draft(row: Response) -> Self {
            let api = Self::default();
            api.state.lock().unwrap().my_draft = Some(row);
            api
        }

        fn draft_saves(&self) -> Vec<AnswerMap> {
            self.state.lock().unwrap().draft_saves.clone()
        }

        fn submits(&self) -> Vec<AnswerMap> {
            self.state.lock().unwrap().submits.clone()
        }

        fn updates(&self) -> Vec<(i32, AnswerMap, bool)> {
            self.state.lock().unwrap().updates.clone()
        }
    }

    impl ResponseApi for MockApi {
        async fn save_draft(&self, _form_id: i32, answers: &AnswerMap) -> Result<Response, Error> {
            let mut state = self.state.lock().unwrap();
            state.draft_saves.push(answers.clone());
            state.next_id += 1;
            Ok(row(state.next_id, answers.clone(), true))
        }

        async fn submit(&self, _form_id: i32, answers: &AnswerMap) -> Result<Response, Error> {
            let mut state = self.state.lock().unwrap();
            state.submits.push(answers.clone());
            state.next_id += 1;
            Ok(row(state.next_id, answers.clone(), false))
        }

        async fn update(&self, response_id: i32, answers: &AnswerMap, is_draft: bool) -> Result<Response, Error> {
            let mut state = self.state.lock().unwrap();
            state.updates.push((response_id, answers.clone(), is_draft));
            Ok(row(response_id, answers.clone(), is_draft))
        }

        async fn my_draft(&self, _form_id: i32) -> Result<Option<Response>, Error> {
            Ok(self.state.lock().unwrap().my_draft.clone())
        }

        async fn response(&self, response_id: i32) -> Result<Response, Error> {
            Ok(row(response_id, AnswerMap::new(), false))
        }
    }

    fn controller(api: MockApi, edit: Option<i32>) -> (DraftHandle, DraftController<MockApi>, Arc<QueryCache<Response>>) {
        let cache = Arc::new(QueryCache::new());
        let (handle, ctrl) = DraftController::new(test_form(), edit, api, cache.clone());
        (handle, ctrl, cache)
    }

    #[tokio::test(start_paused = true)]
    async fn a_burst_of_edits_becomes_exactly_one_draft_save() {
        let api = MockApi::default();
        let (handle, ctrl, _) = controller(api.clone(), None);

        let driver = async move {
            handle.update_answer("mood", AnswerValue::Number(5.0)).await;
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.update_answer("mood", AnswerValue::Number(7.0)).await;
            tokio::time::sleep(Duration::from_millis(1500)).await;
            handle.update_answer("highlight", AnswerValue::Text("shipped".into())).await;
            // now go idle past the debounce window
            tokio::time::sleep(Duration::from_secs(3)).await;
            let snapshot = handle.snapshot().await.unwrap();
            assert!(snapshot.last_saved.is_some());
        };
        tokio::join!(ctrl.run(), driver);

        let saves = api.draft_saves();
        assert_eq!(saves.len(), 1, "debounce must collapse the burst into one save");
        assert_eq!(saves[0].get("mood"), Some(&AnswerValue::Number(7.0)));
        assert_eq!(saves[0].get("highlight"), Some(&AnswerValue::Text("shipped".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn each_idle_period_saves_the_current_snapshot() {
        let api = MockApi::default();
        let (handle, ctrl, _) = controller(api.clone(), None);

        let driver = async move {
            handle.update_answer("mood", AnswerValue::Number(5.0)).await;
            tokio::time::sleep(Duration::from_secs(3)).await;
            handle.update_answer("highlight", AnswerValue::Text("later".into())).await;
            tokio::time::sleep(Duration::from_secs(3)).await;
        };
        tokio::join!(ctrl.run(), driver);

        let saves = api.draft_saves();
        assert_eq!(saves.len(), 2);
        // every save carries the full current answer set, not a delta
        assert_eq!(saves[1].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_validates_required_before_touching_the_network() {
        let api = MockApi::default();
        let (handle, ctrl, _) = controller(api.clone(), None);

        let driver = async move {
            handle.update_answer("highlight", AnswerValue::Text("no mood yet".into())).await;
            let err = handle.submit().await.unwrap_err();
            match err {
                Error::Validation(msg) => assert!(msg.contains("How are you feeling?"), "{msg}"),
                other => panic!("expected validation error, got {other:?}"),
            }
        };
        tokio::join!(ctrl.run(), driver);

        assert!(api.submits().is_empty(), "failed validation must not call the server");
    }

    #[tokio::test(start_paused = true)]
    async fn submit_resets_answers_and_evicts_the_draft_cache() {
        let api = MockApi::default();
        let (handle, ctrl, cache) = controller(api.clone(), None);

        let driver = async move {
            handle.update_answer("mood", AnswerValue::Number(9.0)).await;
            tokio::time::sleep(Duration::from_secs(3)).await;

            let submitted = handle.submit().await.unwrap();
            assert!(!submitted.is_draft);

            let snapshot = handle.snapshot().await.unwrap();
            assert!(snapshot.answers.is_empty());
            assert!(snapshot.last_saved.is_none());

            // a reload right after the submit must not resurrect the draft
            handle.load().await.unwrap();
            let snapshot = handle.snapshot().await.unwrap();
            assert!(snapshot.answers.is_empty());
        };
        tokio::join!(ctrl.run(), driver);

        assert_eq!(api.draft_saves().len(), 1);
        assert_eq!(api.submits().len(), 1);
        assert!(cache.get(&CacheKey::MyDraft { form_id: FORM }).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_inside_the_debounce_window_cancels_the_pending_autosave() {
        let api = MockApi::default();
        let (handle, ctrl, _) = controller(api.clone(), None);

        let driver = async move {
            handle.update_answer("mood", AnswerValue::Number(9.0)).await;
            // submit lands well inside the 2s idle window
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.submit().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        };
        tokio::join!(ctrl.run(), driver);

        assert!(api.draft_saves().is_empty(), "no draft write may land after the submit");
        assert_eq!(api.submits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_blocks_background_refetch_until_the_next_edit() {
        let mut answers = AnswerMap::new();
        answers.insert("mood".into(), AnswerValue::Number(4.0));
        let api = MockApi::with_draft(row(11, answers, true));
        let (handle, ctrl, _) = controller(api.clone(), None);

        let driver = async move {
            handle.load().await.unwrap();
            let snapshot = handle.snapshot().await.unwrap();
            assert_eq!(snapshot.answers.len(), 1);

            handle.clear().await;
            let snapshot = handle.snapshot().await.unwrap();
            assert!(snapshot.answers.is_empty());
            assert!(snapshot.is_cleared);
            assert!(snapshot.last_saved.is_none());

            // the server still has the draft; a background refetch lands now
            handle.load().await.unwrap();
            let snapshot = handle.snapshot().await.unwrap();
            assert!(snapshot.answers.is_empty(), "cleared form must stay empty");

            // editing again lifts the guard
            handle.update_answer("mood", AnswerValue::Number(6.0)).await;
            let snapshot = handle.snapshot().await.unwrap();
            assert!(!snapshot.is_cleared);
            tokio::time::sleep(Duration::from_secs(3)).await;
        };
        tokio::join!(ctrl.run(), driver);

        // clear also cancelled the refetched draft's timer state: the only
        // save is the one triggered by the fresh edit
        assert_eq!(api.draft_saves().len(), 1);
        assert_eq!(api.draft_saves()[0].get("mood"), Some(&AnswerValue::Number(6.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn editing_an_existing_response_goes_through_in_place_updates() {
        let api = MockApi::default();
        let (handle, ctrl, _) = controller(api.clone(), Some(42));

        let driver = async move {
            handle.update_answer("mood", AnswerValue::Number(3.0)).await;
            tokio::time::sleep(Duration::from_secs(3)).await;

            let updated = handle.update().await.unwrap();
            assert_eq!(updated.id, 42);

            // the edited response stays visible locally
            let snapshot = handle.snapshot().await.unwrap();
            assert_eq!(snapshot.answers.len(), 1);

            // submit is the wrong verb in edit mode
            assert!(handle.submit().await.is_err());
        };
        tokio::join!(ctrl.run(), driver);

        let updates = api.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].0, 42);
        assert!(updates[0].2, "auto-save while editing stays a draft write");
        assert!(!updates[1].2, "the explicit update finalizes");
        assert!(api.submits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_edits_are_flushed_when_the_handle_goes_away() {
        let api = MockApi::default();
        let (handle, ctrl, _) = controller(api.clone(), None);

        let driver = async move {
            handle.update_answer("mood", AnswerValue::Number(2.0)).await;
            // handle dropped before the idle timer fires
        };
        tokio::join!(ctrl.run(), driver);

        assert_eq!(api.draft_saves().len(), 1);
    }
}
