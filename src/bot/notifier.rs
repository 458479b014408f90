use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;

use crate::audio::{
    session::{NoticeRef, Notifier},
    track::TrackInfo,
};
use crate::ui::embeds;

/// Envía los avisos del reproductor al canal de texto del último /play
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn now_playing(&self, track: &TrackInfo) -> anyhow::Result<NoticeRef> {
        let message = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().embed(embeds::now_playing(track)))
            .await?;
        Ok(NoticeRef {
            channel_id: message.channel_id.get(),
            message_id: message.id.get(),
        })
    }

    async fn retract(&self, notice: NoticeRef) -> anyhow::Result<()> {
        ChannelId::new(notice.channel_id)
            .delete_message(&self.http, MessageId::new(notice.message_id))
            .await?;
        Ok(())
    }

    async fn notice(&self, text: &str) -> anyhow::Result<()> {
        self.channel_id
            .send_message(&self.http, CreateMessage::new().embed(embeds::error(text)))
            .await?;
        Ok(())
    }
}
