//! Issue lifecycle engine.
//!
//! Owns the confirm/close state machine, the three-bucket listing order and
//! the cache invalidation that keeps listings in step with writes. Every
//! operation takes the [`Caller`] it runs for; the engine never looks up
//! identity on its own.
//!
//! Writes always hit the store first and evict cached listings afterwards.
//! Store calls are synchronous SQLite work and run on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use habitat_shared::{Bucket, CacheKey, Caller, IssueError, IssueId, Role};
use habitat_store::{Database, Issue, IssueImage, NewIssue, StoreError};

use crate::cache::{Listing, ListingCache};
use crate::clock::Clock;
use crate::error::ServerError;
use crate::media::{ImageUploader, RawImage};

/// Store handle shared between request workers.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// Bounds applied to a single submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionLimits {
    pub max_images: usize,
    pub upload_timeout: Duration,
}

/// Media uploaded for a submission that is not stored yet.
///
/// Dropping it without [`PendingMedia::commit`] discards every reference,
/// so an abandoned submission never strands uploads.
struct PendingMedia {
    uploader: Arc<dyn ImageUploader>,
    refs: Vec<String>,
}

impl PendingMedia {
    fn refs(&self) -> &[String] {
        &self.refs
    }

    fn commit(mut self) {
        self.refs.clear();
    }
}

impl Drop for PendingMedia {
    fn drop(&mut self) {
        if self.refs.is_empty() {
            return;
        }
        let refs = std::mem::take(&mut self.refs);
        let uploader = Arc::clone(&self.uploader);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(count = refs.len(), "Discarding uploads of abandoned submission");
                handle.spawn(async move { discard_refs(uploader.as_ref(), &refs).await });
            }
            Err(_) => warn!(count = refs.len(), "No runtime left to discard uploads"),
        }
    }
}

pub struct IssueEngine {
    db: SharedDatabase,
    cache: ListingCache,
    uploader: Arc<dyn ImageUploader>,
    clock: Arc<dyn Clock>,
    limits: SubmissionLimits,
}

impl IssueEngine {
    pub fn new(
        db: SharedDatabase,
        cache: ListingCache,
        uploader: Arc<dyn ImageUploader>,
        clock: Arc<dyn Clock>,
        limits: SubmissionLimits,
    ) -> Self {
        Self {
            db,
            cache,
            uploader,
            clock,
            limits,
        }
    }

    // ------------------------------------------------------------------
    // Submit
    // ------------------------------------------------------------------

    /// File a new issue for a resident.
    ///
    /// Empty image payloads are skipped. The remaining images are uploaded
    /// concurrently and the issue is stored only once all of them succeed.
    /// If any upload fails, or the caller gives up before the issue is
    /// stored, the uploads that did succeed are discarded.
    pub async fn submit(
        &self,
        caller: &Caller,
        content: &str,
        images: Vec<RawImage>,
    ) -> Result<Issue, ServerError> {
        if caller.role != Role::Resident {
            return Err(IssueError::Forbidden("only residents can report issues".into()).into());
        }
        if content.trim().is_empty() {
            return Err(IssueError::InvalidContent.into());
        }

        let images: Vec<RawImage> = images.into_iter().filter(|i| !i.is_empty()).collect();
        if images.len() > self.limits.max_images {
            return Err(ServerError::BadRequest(format!(
                "Too many images: {} (max {})",
                images.len(),
                self.limits.max_images
            )));
        }

        let pending = self.upload_all(images).await?;

        let new_issue = NewIssue {
            content: content.to_string(),
            reporter: caller.username.clone(),
            report_date: self.clock.today(),
            images: pending.refs().iter().map(IssueImage::new).collect(),
        };

        // The guard moves into the store call, so the commit decision is made
        // next to the insert even if this future is dropped meanwhile.
        let issue = self
            .with_store(move |db| {
                let inserted = db.insert_issue(&new_issue)?;
                pending.commit();
                Ok(inserted)
            })
            .await?;

        self.cache
            .evict(&[CacheKey::Resident(caller.username.clone()), CacheKey::Global])
            .await;

        info!(
            issue_id = %issue.id,
            reporter = %issue.reporter,
            images = issue.images.len(),
            "Issue submitted"
        );
        Ok(issue)
    }

    /// Upload every image in parallel, all or nothing.
    ///
    /// The batch runs detached from the caller and reports back over a
    /// channel. If the caller is gone by then, the undelivered
    /// [`PendingMedia`] is dropped and its uploads discarded.
    async fn upload_all(&self, images: Vec<RawImage>) -> Result<PendingMedia, ServerError> {
        if images.is_empty() {
            return Ok(PendingMedia {
                uploader: Arc::clone(&self.uploader),
                refs: Vec::new(),
            });
        }

        let (tx, rx) = oneshot::channel();
        let uploader = Arc::clone(&self.uploader);
        let timeout = self.limits.upload_timeout;
        tokio::spawn(async move {
            let outcome = upload_batch(uploader, images, timeout).await;
            if tx.send(outcome).is_err() {
                debug!("Submitter went away during upload");
            }
        });

        match rx.await {
            Ok(Ok(pending)) => Ok(pending),
            Ok(Err(reason)) => Err(IssueError::UploadFailure(reason).into()),
            Err(_) => Err(IssueError::UploadFailure("upload batch aborted".into()).into()),
        }
    }

    // ------------------------------------------------------------------
    // Confirm / close
    // ------------------------------------------------------------------

    /// Move an issue from not-confirmed to confirmed.
    pub async fn confirm(&self, caller: &Caller, id: IssueId) -> Result<(), ServerError> {
        require_host(caller, "confirm")?;

        let outcome = self.with_store(move |db| db.confirm_issue(id)).await?;
        outcome.into_result(id)?;

        // Bucket membership changed; no cached listing can be trusted.
        self.cache.evict_all().await;

        info!(issue_id = %id, host = %caller.username, "Issue confirmed");
        Ok(())
    }

    /// Close a confirmed issue as of today.
    pub async fn close(&self, caller: &Caller, id: IssueId) -> Result<(), ServerError> {
        require_host(caller, "close")?;

        let today = self.clock.today();
        let outcome = self.with_store(move |db| db.close_issue(id, today)).await?;
        outcome.into_result(id)?;

        self.cache.evict_all().await;

        info!(issue_id = %id, host = %caller.username, closed_date = %today, "Issue closed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// The listing the caller is entitled to: residents get their own
    /// issues, hosts get everything.
    pub async fn list_for(&self, caller: &Caller) -> Result<Listing, ServerError> {
        match caller.role {
            Role::Resident => self.list_for_resident(&caller.username).await,
            Role::Host => self.list_all().await,
        }
    }

    pub async fn list_for_resident(&self, username: &str) -> Result<Listing, ServerError> {
        self.listing(CacheKey::Resident(username.to_string())).await
    }

    pub async fn list_all(&self) -> Result<Listing, ServerError> {
        self.listing(CacheKey::Global).await
    }

    /// Read-through lookup of one cached listing.
    async fn listing(&self, key: CacheKey) -> Result<Listing, ServerError> {
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let epoch = self.cache.epoch().await;
        let reporter = match &key {
            CacheKey::Resident(username) => Some(username.clone()),
            CacheKey::Global => None,
        };
        let listing = Arc::new(self.with_store(move |db| compose(db, reporter.as_deref())).await?);

        let cached = self
            .cache
            .insert_if_current(key.clone(), Arc::clone(&listing), epoch)
            .await;
        debug!(key = %key, issues = listing.len(), cached, "Listing computed");
        Ok(listing)
    }

    /// Run a store operation on the blocking pool while holding the store lock.
    async fn with_store<T, F>(&self, op: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let mut db = Arc::clone(&self.db).lock_owned().await;
        let result = tokio::task::spawn_blocking(move || op(&mut *db))
            .await
            .map_err(|e| ServerError::Blocking(e.to_string()))?;
        Ok(result?)
    }
}

/// Concatenate the three buckets in listing order.
fn compose(db: &Database, reporter: Option<&str>) -> Result<Vec<Issue>, StoreError> {
    let mut issues = Vec::new();
    for bucket in Bucket::LISTING_ORDER {
        issues.extend(db.list_bucket(bucket, reporter)?);
    }
    Ok(issues)
}

async fn upload_batch(
    uploader: Arc<dyn ImageUploader>,
    images: Vec<RawImage>,
    timeout: Duration,
) -> Result<PendingMedia, String> {
    let waits = images.into_iter().map(|image| {
        let task = Arc::clone(&uploader);
        let handle = tokio::spawn(async move { task.upload(image).await });
        await_upload(handle, timeout, Arc::clone(&uploader))
    });

    let mut pending = PendingMedia {
        uploader: Arc::clone(&uploader),
        refs: Vec::new(),
    };
    let mut failures = Vec::new();
    for result in join_all(waits).await {
        match result {
            Ok(media_ref) => pending.refs.push(media_ref),
            Err(reason) => failures.push(reason),
        }
    }

    if failures.is_empty() {
        return Ok(pending);
    }

    warn!(
        failed = failures.len(),
        succeeded = pending.refs.len(),
        "Image upload failed, rolling back submission"
    );
    let uploaded = std::mem::take(&mut pending.refs);
    discard_refs(uploader.as_ref(), &uploaded).await;
    Err(failures.join("; "))
}

/// Wait for one upload, giving up after `timeout`.
///
/// A timed-out upload is not cancelled mid-write; it is left to finish and
/// whatever it produced is discarded.
async fn await_upload(
    mut handle: JoinHandle<Result<String, ServerError>>,
    timeout: Duration,
    uploader: Arc<dyn ImageUploader>,
) -> Result<String, String> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(media_ref))) => Ok(media_ref),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(e)) => Err(format!("upload task failed: {e}")),
        Err(_) => {
            tokio::spawn(async move {
                if let Ok(Ok(media_ref)) = handle.await {
                    discard_refs(uploader.as_ref(), &[media_ref]).await;
                }
            });
            Err(format!("upload timed out after {}s", timeout.as_secs()))
        }
    }
}

async fn discard_refs(uploader: &dyn ImageUploader, media_refs: &[String]) {
    for media_ref in media_refs {
        if let Err(e) = uploader.discard(media_ref).await {
            warn!(media_ref = %media_ref, error = %e, "Failed to discard uploaded image");
        }
    }
}

fn require_host(caller: &Caller, action: &str) -> Result<(), IssueError> {
    if caller.is_host() {
        Ok(())
    } else {
        Err(IssueError::Forbidden(format!("only hosts can {action} issues")))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn image(bytes: &'static [u8]) -> RawImage {
        RawImage::new(bytes)
    }

    fn ids(listing: &[Issue]) -> Vec<IssueId> {
        listing.iter().map(|i| i.id).collect()
    }

    fn assert_closed_implies_confirmed(listing: &[Issue]) {
        for issue in listing {
            if issue.closed_date.is_some() {
                assert!(issue.confirmed, "closed issue {} is not confirmed", issue.id);
            }
        }
    }

    #[tokio::test]
    async fn test_resident_walkthrough() {
        let f = fixture();
        let alice = Caller::resident("alice");
        let host = Caller::host("hank");

        let issue = f
            .engine
            .submit(&alice, "leak in unit 4B", vec![image(b"one"), image(b"two")])
            .await
            .unwrap();
        assert_eq!(issue.report_date, day(1));

        let listing = f.engine.list_for_resident("alice").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].bucket(), Bucket::NotConfirmed);
        assert_eq!(listing[0].images.len(), 2);
        assert_eq!(listing[0].content, "leak in unit 4B");

        f.engine.confirm(&host, issue.id).await.unwrap();
        let listing = f.engine.list_for_resident("alice").await.unwrap();
        assert_eq!(listing[0].bucket(), Bucket::ConfirmedOpen);

        f.clock.set(day(9));
        f.engine.close(&host, issue.id).await.unwrap();
        let listing = f.engine.list_for_resident("alice").await.unwrap();
        assert_eq!(listing[0].bucket(), Bucket::Closed);
        assert_eq!(listing[0].closed_date, Some(day(9)));

        let err = f.engine.close(&host, issue.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::AlreadyClosed(id)) if id == issue.id));
    }

    #[tokio::test]
    async fn test_confirm_errors() {
        let f = fixture();
        let host = Caller::host("hank");

        let err = f.engine.confirm(&host, IssueId(77)).await.unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::IssueNotFound(IssueId(77)))));

        let issue = f
            .engine
            .submit(&Caller::resident("bob"), "loose tile", vec![])
            .await
            .unwrap();
        f.engine.confirm(&host, issue.id).await.unwrap();
        let err = f.engine.confirm(&host, issue.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::AlreadyConfirmed(_))));
    }

    #[tokio::test]
    async fn test_close_requires_confirmation() {
        let f = fixture();
        let host = Caller::host("hank");
        let issue = f
            .engine
            .submit(&Caller::resident("bob"), "broken light", vec![])
            .await
            .unwrap();

        let err = f.engine.close(&host, issue.id).await.unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::NotConfirmed(_))));

        let err = f.engine.close(&host, IssueId(999)).await.unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::IssueNotFound(_))));

        let stored = f.db.lock().await.get_issue(issue.id).unwrap();
        assert!(stored.closed_date.is_none());
    }

    #[tokio::test]
    async fn test_roles_enforced() {
        let f = fixture();
        let err = f
            .engine
            .submit(&Caller::host("hank"), "not mine to file", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::Forbidden(_))));

        let issue = f
            .engine
            .submit(&Caller::resident("bob"), "stuck door", vec![])
            .await
            .unwrap();
        let err = f
            .engine
            .confirm(&Caller::resident("bob"), issue.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::Forbidden(_))));
        let err = f
            .engine
            .close(&Caller::resident("bob"), issue.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_blank_content_rejected() {
        let f = fixture();
        let err = f
            .engine
            .submit(&Caller::resident("bob"), "  \n ", vec![image(b"x")])
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::InvalidContent)));
        assert!(f.uploader.uploaded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_payloads_skipped() {
        let f = fixture();
        let issue = f
            .engine
            .submit(
                &Caller::resident("bob"),
                "cracked window",
                vec![image(b""), image(b"real"), image(b"")],
            )
            .await
            .unwrap();
        assert_eq!(issue.images.len(), 1);
    }

    #[tokio::test]
    async fn test_too_many_images_rejected() {
        let f = fixture();
        let images = (0..5).map(|_| image(b"img")).collect();
        let err = f
            .engine
            .submit(&Caller::resident("bob"), "many photos", images)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_upload_failure_is_all_or_nothing() {
        let f = fixture_with(StubUploader::failing(b"bad"), Duration::from_secs(5));
        let bob = Caller::resident("bob");

        // Warm the cache so we can see it is left alone.
        assert!(f.engine.list_for_resident("bob").await.unwrap().is_empty());

        let err = f
            .engine
            .submit(&bob, "flooded garage", vec![image(b"good"), image(b"bad")])
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::UploadFailure(_))));

        assert_eq!(f.db.lock().await.count_issues().unwrap(), 0);
        let uploaded = f.uploader.uploaded.lock().unwrap().clone();
        let discarded = f.uploader.discarded.lock().unwrap().clone();
        assert_eq!(uploaded, discarded);
        assert!(f
            .cache
            .get(&CacheKey::Resident("bob".into()))
            .await
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_timeout_is_failure() {
        let f = fixture_with(StubUploader::stalling(b"slow"), Duration::from_secs(2));

        let err = f
            .engine
            .submit(&Caller::resident("bob"), "noisy pipes", vec![image(b"slow")])
            .await
            .unwrap_err();
        match err {
            ServerError::Issue(IssueError::UploadFailure(reason)) => {
                assert!(reason.contains("timed out"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.db.lock().await.count_issues().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_submission_discards_uploads() {
        let f = fixture_with(
            StubUploader::delayed(Duration::from_millis(100)),
            Duration::from_secs(5),
        );
        let bob = Caller::resident("bob");

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            f.engine
                .submit(&bob, "dripping tap", vec![image(b"a"), image(b"b")]),
        )
        .await;
        assert!(abandoned.is_err());

        // Let the detached uploads finish and their cleanup run.
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(f.db.lock().await.count_issues().unwrap(), 0);
        let mut uploaded = f.uploader.uploaded.lock().unwrap().clone();
        let mut discarded = f.uploader.discarded.lock().unwrap().clone();
        uploaded.sort();
        discarded.sort();
        assert_eq!(uploaded.len(), 2);
        assert_eq!(uploaded, discarded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_upload_discarded_once_finished() {
        let f = fixture_with(
            StubUploader::delayed(Duration::from_secs(3)),
            Duration::from_secs(1),
        );

        let err = f
            .engine
            .submit(&Caller::resident("bob"), "late photo", vec![image(b"late")])
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Issue(IssueError::UploadFailure(_))));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let uploaded = f.uploader.uploaded.lock().unwrap().clone();
        let discarded = f.uploader.discarded.lock().unwrap().clone();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded, discarded);
    }

    #[tokio::test]
    async fn test_content_stored_as_written() {
        let f = fixture();
        let issue = f
            .engine
            .submit(&Caller::resident("bob"), "  mould behind the fridge\n", vec![])
            .await
            .unwrap();
        assert_eq!(issue.content, "  mould behind the fridge\n");

        let stored = f.db.lock().await.get_issue(issue.id).unwrap();
        assert_eq!(stored.content, "  mould behind the fridge\n");
    }

    #[tokio::test]
    async fn test_unconfirmed_ordered_oldest_first() {
        let f = fixture();
        let bob = Caller::resident("bob");

        f.clock.set(day(10));
        let newer = f.engine.submit(&bob, "newer", vec![]).await.unwrap();
        f.clock.set(day(3));
        let older = f.engine.submit(&bob, "older", vec![]).await.unwrap();

        let listing = f.engine.list_for_resident("bob").await.unwrap();
        assert_eq!(ids(&listing), vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn test_closed_bucket_most_recent_first() {
        let f = fixture();
        let host = Caller::host("hank");
        let mut closed = Vec::new();
        for (who, close_day) in [("amy", 5), ("bob", 20), ("cy", 12)] {
            let issue = f
                .engine
                .submit(&Caller::resident(who), "closed later", vec![])
                .await
                .unwrap();
            f.engine.confirm(&host, issue.id).await.unwrap();
            f.clock.set(day(close_day));
            f.engine.close(&host, issue.id).await.unwrap();
            closed.push(issue.id);
        }

        let listing = f.engine.list_all().await.unwrap();
        assert_eq!(ids(&listing), vec![closed[1], closed[2], closed[0]]);
        assert!(listing.iter().all(|i| i.bucket() == Bucket::Closed));
    }

    #[tokio::test]
    async fn test_list_all_concatenates_buckets() {
        let f = fixture();
        let host = Caller::host("hank");

        f.clock.set(day(1));
        let closed = f.engine.submit(&Caller::resident("amy"), "a", vec![]).await.unwrap();
        f.clock.set(day(2));
        let open_old = f.engine.submit(&Caller::resident("bob"), "b", vec![]).await.unwrap();
        f.clock.set(day(3));
        let unconfirmed = f.engine.submit(&Caller::resident("amy"), "c", vec![]).await.unwrap();
        f.clock.set(day(4));
        let open_new = f.engine.submit(&Caller::resident("cy"), "d", vec![]).await.unwrap();

        for id in [closed.id, open_old.id, open_new.id] {
            f.engine.confirm(&host, id).await.unwrap();
        }
        f.engine.close(&host, closed.id).await.unwrap();

        let listing = f.engine.list_all().await.unwrap();
        assert_eq!(
            ids(&listing),
            vec![unconfirmed.id, open_old.id, open_new.id, closed.id]
        );
        assert_closed_implies_confirmed(&listing);

        let buckets: Vec<Bucket> = listing.iter().map(Issue::bucket).collect();
        assert_eq!(
            buckets,
            vec![
                Bucket::NotConfirmed,
                Bucket::ConfirmedOpen,
                Bucket::ConfirmedOpen,
                Bucket::Closed
            ]
        );

        let amys = f.engine.list_for_resident("amy").await.unwrap();
        assert_eq!(ids(&amys), vec![unconfirmed.id, closed.id]);
        assert!(amys.iter().all(|i| i.reporter == "amy"));
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        let f = fixture();
        assert!(f.engine.list_all().await.unwrap().is_empty());
        assert!(f.engine.list_for_resident("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cached_listing_refreshed_after_confirm_and_close() {
        let f = fixture();
        let host = Caller::host("hank");
        let issue = f
            .engine
            .submit(&Caller::resident("alice"), "gate stuck", vec![])
            .await
            .unwrap();

        let before = f.engine.list_all().await.unwrap();
        let resident_before = f.engine.list_for_resident("alice").await.unwrap();
        assert_eq!(before[0].bucket(), Bucket::NotConfirmed);
        assert_eq!(resident_before[0].bucket(), Bucket::NotConfirmed);

        f.engine.confirm(&host, issue.id).await.unwrap();
        assert_eq!(f.cache.len().await, 0);
        assert_eq!(f.engine.list_all().await.unwrap()[0].bucket(), Bucket::ConfirmedOpen);
        assert_eq!(
            f.engine.list_for_resident("alice").await.unwrap()[0].bucket(),
            Bucket::ConfirmedOpen
        );

        f.engine.close(&host, issue.id).await.unwrap();
        assert_eq!(f.engine.list_all().await.unwrap()[0].bucket(), Bucket::Closed);
        assert_eq!(
            f.engine.list_for_resident("alice").await.unwrap()[0].bucket(),
            Bucket::Closed
        );
    }

    #[tokio::test]
    async fn test_submit_evicts_only_reporter_and_global() {
        let f = fixture();
        f.engine.list_all().await.unwrap();
        f.engine.list_for_resident("alice").await.unwrap();
        f.engine.list_for_resident("bob").await.unwrap();

        f.engine
            .submit(&Caller::resident("alice"), "pest problem", vec![])
            .await
            .unwrap();

        assert!(f.cache.get(&CacheKey::Global).await.is_none());
        assert!(f.cache.get(&CacheKey::Resident("alice".into())).await.is_none());
        assert!(f.cache.get(&CacheKey::Resident("bob".into())).await.is_some());

        assert_eq!(f.engine.list_all().await.unwrap().len(), 1);
        assert_eq!(f.engine.list_for_resident("alice").await.unwrap().len(), 1);
        assert!(f.engine.list_for_resident("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_for_dispatches_on_role() {
        let f = fixture();
        f.engine.submit(&Caller::resident("amy"), "a", vec![]).await.unwrap();
        f.engine.submit(&Caller::resident("bob"), "b", vec![]).await.unwrap();

        let amy = f.engine.list_for(&Caller::resident("amy")).await.unwrap();
        assert_eq!(amy.len(), 1);
        let host = f.engine.list_for(&Caller::host("hank")).await.unwrap();
        assert_eq!(host.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_confirms_apply_once() {
        let f = Arc::new(fixture());
        let issue = f
            .engine
            .submit(&Caller::resident("bob"), "race", vec![])
            .await
            .unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                f.engine.confirm(&Caller::host(format!("host{n}")), issue.id).await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => applied += 1,
                Err(ServerError::Issue(IssueError::AlreadyConfirmed(_))) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(applied, 1);
    }
}
