//! Fan-out driver that scans a channel list and assembles a tabular result,
//! grounded in `tg/stats/stats_collector.py`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::account::scanner::{Scanner, ScannerError};
use crate::rpc::RpcClientFactory;
use crate::utils::progress::ProgressReporter;

const TEXT_PREVIEW_LEN: usize = 200;
/// Cap above which replies-count failures for an individual message are
/// logged and defaulted to zero rather than failing the whole scan, mirroring
/// the original's per-message `try/except` around `add_replies`.
const REPLIES_DEFAULT_ON_ERROR: i64 = 0;

/// One message row.
#[derive(Debug, Clone)]
pub struct Msg {
    pub username: String,
    pub link: String,
    pub reach: i64,
    pub likes: i64,
    pub replies: i64,
    pub forwards: i64,
    pub datetime: DateTime<Utc>,
    pub text: String,
    pub full_text: String,
    pub popularity: f64,
}

/// One channel row.
#[derive(Debug, Clone)]
pub struct Channel {
    pub username: String,
    pub subscribers: u64,
}

/// Final per-channel row merging subscriber count with mean message reach
/// (merges mean reach per channel with subscriber counts).
#[derive(Debug, Clone)]
pub struct ChannelStats {
    pub username: String,
    pub subscribers: u64,
    pub reach: i64,
}

pub struct CollectedStats {
    pub msgs: Vec<Msg>,
    pub channels: Vec<Channel>,
    pub stats: Vec<ChannelStats>,
}

/// Drives a full statistics scan over a channel list, in either sequential
/// (progress-reported) or parallel mode.
pub struct StatsCollector<F: RpcClientFactory> {
    scanner: Arc<Scanner<F>>,
    min_date: Option<DateTime<Utc>>,
}

impl<F: RpcClientFactory + 'static> StatsCollector<F> {
    pub fn new(scanner: Arc<Scanner<F>>, min_date: Option<DateTime<Utc>>) -> Self {
        Self { scanner, min_date }
    }

    pub fn with_depth_days(scanner: Arc<Scanner<F>>, depth_days: i64) -> Self {
        let min_date = Utc::now() - chrono::Duration::days(depth_days);
        Self::new(scanner, Some(min_date))
    }

    /// Scans every channel, then post-processes into the final table.
    /// Composes the scanner's outer session over the whole scan.
    pub async fn collect_all_stats(
        &self,
        channels: &[String],
        pbar: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<CollectedStats, ScannerError> {
        let guard = self.scanner.session(pbar.clone()).await?;

        let (msgs, channel_stats) = match pbar {
            Some(pbar) => self.sequential_scan(channels, pbar).await?,
            None => self.parallel_scan(channels).await?,
        };

        guard.close().await?;

        let msgs = Self::calc_popularity(msgs);
        let stats = Self::merge_channel_stats(&channel_stats, &msgs);

        Ok(CollectedStats { msgs, channels: channel_stats, stats })
    }

    /// Sequential mode: one channel at a time, reporting progress.
    async fn sequential_scan(
        &self,
        channels: &[String],
        pbar: Arc<dyn ProgressReporter>,
    ) -> Result<(Vec<Msg>, Vec<Channel>), ScannerError> {
        let mut msgs = Vec::new();
        let mut channel_stats = Vec::new();

        for channel in channels {
            pbar.set_postfix(channel);
            msgs.extend(self.collect_msg_stats(channel).await?);
            channel_stats.push(self.collect_channel_stats(channel).await?);
            pbar.inc();
        }

        Ok((msgs, channel_stats))
    }

    /// Parallel mode: fans out all per-channel message scans
    /// concurrently, then all per-channel subscriber-count scans.
    async fn parallel_scan(&self, channels: &[String]) -> Result<(Vec<Msg>, Vec<Channel>), ScannerError> {
        let msg_futures = channels.iter().map(|c| self.collect_msg_stats(c));
        let channel_futures = channels.iter().map(|c| self.collect_channel_stats(c));

        let msgs = try_join_all(msg_futures).await?.into_iter().flatten().collect();
        let channel_stats = try_join_all(channel_futures).await?;

        Ok((msgs, channel_stats))
    }

    /// Streams a channel's history, then fans out one replies-count lookup
    /// per message concurrently.
    async fn collect_msg_stats(&self, channel: &str) -> Result<Vec<Msg>, ScannerError> {
        debug!("Collecting message stats for {}", channel);
        let history = self.scanner.get_chat_history(channel, None, self.min_date).await?;
        let count = history.len();

        let mut by_id: HashMap<i64, Msg> = HashMap::new();
        for raw in history {
            let channel_name = channel.trim_start_matches('@');
            let link = format!("https://t.me/{channel_name}/{}", raw.id);
            let full_text = raw.text.clone();

            by_id.insert(
                raw.id,
                Msg {
                    username: channel.to_string(),
                    link,
                    reach: raw.views.unwrap_or(0) as i64,
                    likes: raw.reaction_count as i64,
                    replies: 0,
                    forwards: raw.forwards.unwrap_or(0) as i64,
                    datetime: raw.date,
                    text: shorten(&full_text),
                    full_text,
                    popularity: 0.0,
                },
            );
        }

        debug!("Collected {} messages from {}, fetching reply counts", count, channel);

        let reply_futures = by_id.into_iter().map(|(msg_id, msg)| async move {
            match self.scanner.get_discussion_replies_count(channel, msg_id).await {
                Ok(replies) => Msg { replies: replies as i64, ..msg },
                Err(e) => {
                    warn!("Failed to get replies count for {} msg {}: {}", channel, msg_id, e);
                    Msg { replies: REPLIES_DEFAULT_ON_ERROR, ..msg }
                }
            }
        });

        Ok(futures::future::join_all(reply_futures).await)
    }

    async fn collect_channel_stats(&self, channel: &str) -> Result<Channel, ScannerError> {
        let subscribers = self.scanner.get_chat_members_count(channel).await?;
        Ok(Channel { username: channel.to_string(), subscribers })
    }

    /// popularity = `(likes + replies + forwards) / reach`, `0.0`
    /// when `reach == 0` rather than propagating a division error.
    fn calc_popularity(msgs: Vec<Msg>) -> Vec<Msg> {
        msgs.into_iter()
            .map(|msg| {
                let popularity = if msg.reach == 0 {
                    0.0
                } else {
                    (msg.likes + msg.replies + msg.forwards) as f64 / msg.reach as f64
                };
                Msg { popularity, ..msg }
            })
            .collect()
    }

    /// Merges mean reach per channel with channel subscribers; missing reach
    /// becomes 0.
    fn merge_channel_stats(channels: &[Channel], msgs: &[Msg]) -> Vec<ChannelStats> {
        let mut reach_sum: HashMap<&str, (i64, i64)> = HashMap::new();
        for msg in msgs {
            let entry = reach_sum.entry(msg.username.as_str()).or_insert((0, 0));
            entry.0 += msg.reach;
            entry.1 += 1;
        }

        channels
            .iter()
            .map(|channel| {
                let reach = reach_sum
                    .get(channel.username.as_str())
                    .map(|(sum, count)| if *count > 0 { sum / count } else { 0 })
                    .unwrap_or(0);
                ChannelStats {
                    username: channel.username.clone(),
                    subscribers: channel.subscribers,
                    reach,
                }
            })
            .collect()
    }

    /// Scans, then persists both the per-channel stats and the message table.
    pub async fn collect_and_save(
        &self,
        channels: &[String],
        stats_db: &crate::stats::db::StatsDb,
        pbar: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<CollectedStats, crate::utils::errors::BridgeError> {
        let collected = self.collect_all_stats(channels, pbar).await?;
        stats_db.save_new_stats(&collected.stats).await?;
        stats_db.save_msgs(&collected.msgs).await?;
        info!("Stats collection complete: {} messages, {} channels", collected.msgs.len(), collected.channels.len());
        Ok(collected)
    }
}

/// Truncates to the first 200 chars + "…" when longer, else unchanged.
fn shorten(text: &str) -> String {
    let char_count = text.chars().count();
    if char_count > TEXT_PREVIEW_LEN {
        let truncated: String = text.chars().take(TEXT_PREVIEW_LEN).collect();
        format!("{truncated}…")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(reach: i64, likes: i64, replies: i64, forwards: i64) -> Msg {
        Msg {
            username: "@chan".to_string(),
            link: "https://t.me/chan/1".to_string(),
            reach,
            likes,
            replies,
            forwards,
            datetime: Utc::now(),
            text: String::new(),
            full_text: String::new(),
            popularity: 0.0,
        }
    }

    #[test]
    fn shorten_passes_short_text_through_unchanged() {
        assert_eq!(shorten("hello"), "hello");
    }

    #[test]
    fn shorten_truncates_long_text_with_ellipsis() {
        let long = "a".repeat(250);
        let shortened = shorten(&long);
        assert_eq!(shortened.chars().count(), TEXT_PREVIEW_LEN + 1);
        assert!(shortened.ends_with('…'));
    }

    #[test]
    fn popularity_is_zero_when_reach_is_zero() {
        let msgs = StatsCollector::<crate::rpc::fakes::FakeRpcClientFactory>::calc_popularity(vec![msg(0, 5, 5, 5)]);
        assert_eq!(msgs[0].popularity, 0.0);
    }

    #[test]
    fn popularity_divides_engagement_by_reach() {
        let msgs = StatsCollector::<crate::rpc::fakes::FakeRpcClientFactory>::calc_popularity(vec![msg(100, 5, 3, 2)]);
        assert_eq!(msgs[0].popularity, 0.1);
    }

    #[test]
    fn merge_channel_stats_computes_mean_reach_per_channel_and_defaults_missing_to_zero() {
        let channels = vec![
            Channel { username: "@chan".to_string(), subscribers: 1000 },
            Channel { username: "@empty".to_string(), subscribers: 50 },
        ];
        let msgs = vec![msg(100, 0, 0, 0), msg(300, 0, 0, 0)];

        let stats =
            StatsCollector::<crate::rpc::fakes::FakeRpcClientFactory>::merge_channel_stats(&channels, &msgs);

        let chan = stats.iter().find(|s| s.username == "@chan").unwrap();
        assert_eq!(chan.reach, 200);
        assert_eq!(chan.subscribers, 1000);

        let empty = stats.iter().find(|s| s.username == "@empty").unwrap();
        assert_eq!(empty.reach, 0);
        assert_eq!(empty.subscribers, 50);
    }
}
