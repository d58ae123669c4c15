//! The channel participant: operations shared by authors and subscribers.
//!
//! A [`User`] owns an identity, a transport handle and its session state.
//! [`Author`](crate::Author) and [`Subscriber`](crate::Subscriber) wrap it
//! and add the operations that need their authority.

use bytes::Bytes;

use plait_core::{
    BranchingMode, ChannelId, Cursor, Ed25519PublicKey, EncryptionKey, Frame, FrameBuilder,
    Identifier, Identity, Link, MessageKind, PskId, WrappedFrame, X25519PublicKey,
};
use plait_keyload::{KeyloadError, KeyloadPayload, Recipients};
use plait_transport::{SendOutcome, Transport};

use crate::config::UserConfig;
use crate::error::{ChannelError, Result};
use crate::message::{Message, SendResponse, Status};
use crate::payload::{self, AnnouncePayload, SequencePayload, SubscribePayload};
use crate::state::{ChannelInfo, SessionState};
use crate::walker::MessageWalker;

/// What to do when a message names a key this user does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnDenied {
    /// Fail with `NoAccess`; nothing is committed.
    Fail,
    /// Yield the message without its masked payload and move past it.
    Yield,
}

/// Where a new message goes.
struct Placement {
    link: Link,
    previous: Link,
    seq: u64,
    /// `(link, previous)` of the Sequence message, in multi-branch channels.
    sequence: Option<(Link, Link)>,
}

/// Frames of one send, in transmission order.
struct Outgoing {
    frames: Vec<WrappedFrame>,
    response: SendResponse,
}

/// A channel participant.
pub struct User<T> {
    identity: Identity,
    config: UserConfig,
    transport: T,
    pub(crate) state: SessionState,
}

impl<T> std::fmt::Debug for User<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("identifier", &self.identity.identifier())
            .field("channel", &self.state.channel.map(|info| info.id))
            .finish_non_exhaustive()
    }
}

impl<T: Transport> User<T> {
    pub(crate) fn new(seed: &[u8], config: UserConfig, transport: T) -> Result<Self> {
        let identity = Identity::generate(seed)?;
        Ok(Self::from_parts(identity, config, transport, SessionState::new()))
    }

    pub(crate) fn from_parts(
        identity: Identity,
        config: UserConfig,
        transport: T,
        state: SessionState,
    ) -> Self {
        Self {
            identity,
            config,
            transport,
            state,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn identifier(&self) -> Identifier {
        self.identity.identifier()
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.identity.public_key()
    }

    pub fn exchange_public_key(&self) -> X25519PublicKey {
        self.identity.exchange_public_key()
    }

    pub(crate) fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &UserConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The bound channel, if any.
    pub fn channel_address(&self) -> Option<ChannelId> {
        self.state.channel.map(|info| info.id)
    }

    /// The Announce link of the bound channel.
    pub fn announce_link(&self) -> Option<Link> {
        self.state.channel.map(|info| info.announce)
    }

    pub fn channel_author(&self) -> Option<Ed25519PublicKey> {
        self.state.channel.map(|info| info.author)
    }

    /// The bound channel's branching mode, or the configured one while
    /// unbound.
    pub fn branching(&self) -> BranchingMode {
        self.state
            .channel
            .map(|info| info.branching)
            .unwrap_or(self.config.branching)
    }

    pub fn is_multi_branching(&self) -> bool {
        self.branching() == BranchingMode::MultiBranch
    }

    /// Whether this user announced the bound channel.
    pub fn is_channel_author(&self) -> bool {
        self.channel_author() == Some(self.public_key())
    }

    pub fn status(&self) -> Status {
        if self.state.channel.is_none() {
            Status::Unbound
        } else if self.is_channel_author() || self.state.session_keys.current().is_some() {
            Status::Active
        } else if self.state.registration.is_some() {
            Status::Subscribed
        } else {
            Status::Announced
        }
    }

    /// Every tracked publisher with its cursor, in registration order.
    pub fn fetch_state(&self) -> Vec<(Identifier, Cursor)> {
        self.state.sequencing.iter().collect()
    }

    /// The keyload whose key new messages are sealed under.
    pub fn current_keyload(&self) -> Option<Link> {
        self.state.session_keys.current().map(|(link, _)| link)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pre-shared keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a pre-shared key derived from `secret`.
    pub fn store_psk(&mut self, secret: &[u8]) -> Result<PskId> {
        Ok(self.identity.store_psk(secret)?)
    }

    pub fn remove_psk(&mut self, id: &PskId) -> bool {
        self.identity.remove_psk(id)
    }

    pub fn psk_ids(&self) -> Vec<PskId> {
        self.identity.psk_ids().copied().collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish an encrypted, signed packet linked to `link_to`.
    pub async fn send_signed_packet(
        &mut self,
        link_to: &Link,
        public: impl Into<Bytes>,
        masked: impl Into<Bytes>,
    ) -> Result<SendResponse> {
        self.send_packet(MessageKind::SignedPacket, link_to, public.into(), masked.into())
            .await
    }

    /// Publish an encrypted, unsigned packet linked to `link_to`.
    pub async fn send_tagged_packet(
        &mut self,
        link_to: &Link,
        public: impl Into<Bytes>,
        masked: impl Into<Bytes>,
    ) -> Result<SendResponse> {
        self.send_packet(MessageKind::TaggedPacket, link_to, public.into(), masked.into())
            .await
    }

    async fn send_packet(
        &mut self,
        kind: MessageKind,
        link_to: &Link,
        public: Bytes,
        masked: Bytes,
    ) -> Result<SendResponse> {
        let len = public.len() + masked.len();
        if len > self.config.max_payload_len {
            return Err(ChannelError::PayloadTooLarge {
                len,
                max: self.config.max_payload_len,
            });
        }

        self.publish(link_to, |_, draft, link| {
            let keyload = draft.keyload_for(link_to)?;
            let key = draft.session_keys.get(&keyload).ok_or_else(|| {
                ChannelError::NoAccess(format!("no session key for keyload {}", keyload))
            })?;
            Ok(FrameBuilder::new(kind, *link)
                .public(public.clone())
                .masked(masked.clone())
                .encrypt(keyload, key))
        })
        .await
    }

    /// Publish a keyload for `recipients` linked to `link_to`. The author
    /// is always added as a recipient.
    pub(crate) async fn send_keyload_to(
        &mut self,
        link_to: &Link,
        mut recipients: Recipients,
    ) -> Result<SendResponse> {
        if !self.is_channel_author() {
            return Err(ChannelError::NotAuthorized(
                "only the channel author issues keyloads".into(),
            ));
        }
        if recipients.is_empty() {
            return Err(ChannelError::EmptyRecipientSet);
        }
        recipients.add_member(self.public_key(), self.exchange_public_key());

        let response = self
            .publish(link_to, |identity, draft, link| {
                let key = EncryptionKey::generate();
                let payload = KeyloadPayload::seal(link, &key, &recipients, identity)?;
                for (public_key, exchange_key) in payload.members() {
                    draft.learn_participant(public_key, exchange_key)?;
                }
                draft.session_keys.adopt(*link, key);
                Ok(FrameBuilder::new(MessageKind::Keyload, *link).public(payload.to_bytes()?))
            })
            .await?;
        tracing::info!(
            link = %response.link,
            recipients = recipients.len(),
            "sent keyload"
        );
        Ok(response)
    }

    /// Send one sequenced message linked to `link_to`.
    ///
    /// When the message's address is already taken by a frame this user
    /// signed for the same sequence number, an earlier send was cut off
    /// after storing it. That frame is completed and the message is placed
    /// after it.
    async fn publish<F>(&mut self, link_to: &Link, mut build: F) -> Result<SendResponse>
    where
        F: FnMut(&Identity, &mut SessionState, &Link) -> Result<FrameBuilder>,
    {
        loop {
            let mut draft = self.state.clone();
            let outgoing = self.prepare(&mut draft, link_to, &mut build)?;
            match self.commit(draft, outgoing).await {
                Err(ChannelError::LinkConflict(link)) => {
                    if !self.resume_interrupted(&link).await? {
                        return Err(ChannelError::LinkConflict(link));
                    }
                }
                result => return result,
            }
        }
    }

    /// Place, build and sign one sequenced message on `draft`.
    ///
    /// `build` receives the message's link and returns a builder for it
    /// carrying the payloads. Placement fields are filled in afterwards.
    fn prepare<F>(
        &self,
        draft: &mut SessionState,
        link_to: &Link,
        build: &mut F,
    ) -> Result<Outgoing>
    where
        F: FnMut(&Identity, &mut SessionState, &Link) -> Result<FrameBuilder>,
    {
        let me = self.identifier();
        let placement = place(draft, &me, link_to)?;

        let content = build(&self.identity, draft, &placement.link)?
            .previous(placement.previous)
            .seq(placement.seq)
            .build(&self.identity)?;
        draft.record_keyload(&content.header);

        let mut frames = vec![content];
        let mut sequence_link = None;
        if let Some((link, previous)) = placement.sequence {
            frames.push(self.sequence_frame(link, previous, placement.seq, placement.link)?);
            sequence_link = Some(link);
        }

        for frame in &frames {
            draft.mark_seen(frame.header.link, frame.digest);
        }

        Ok(Outgoing {
            frames,
            response: SendResponse {
                link: placement.link,
                sequence: sequence_link,
            },
        })
    }

    /// Transmit prepared frames and commit `draft` once all were accepted.
    async fn commit(&mut self, draft: SessionState, outgoing: Outgoing) -> Result<SendResponse> {
        for frame in &outgoing.frames {
            self.transmit(frame).await?;
        }
        self.state = draft;
        Ok(outgoing.response)
    }

    fn sequence_frame(
        &self,
        link: Link,
        previous: Link,
        seq: u64,
        ref_link: Link,
    ) -> Result<WrappedFrame> {
        let payload = SequencePayload {
            publisher: self.identifier(),
            seq,
            ref_link,
        };
        Ok(FrameBuilder::new(MessageKind::Sequence, link)
            .previous(previous)
            .seq(seq)
            .public(payload::encode(&payload)?)
            .build(&self.identity)?)
    }

    /// Take over a frame of ours found at `link` that no committed state
    /// accounts for. Returns `false` when the frame belongs to someone
    /// else or to another position, leaving the state untouched.
    async fn resume_interrupted(&mut self, link: &Link) -> Result<bool> {
        let me = self.identifier();
        let frame = match self.try_fetch_frame(link).await {
            Ok(Some(frame)) => frame,
            _ => return Ok(false),
        };

        let mut draft = self.state.clone();
        if !draft.sequencing.contains(&me) {
            draft.track(me)?;
        }
        let Some(cursor) = draft.sequencing.cursor_for(&me) else {
            return Ok(false);
        };
        if frame.sender() != me || frame.header.seq != cursor.seq {
            return Ok(false);
        }

        let mode = draft.sequencing.mode();
        match (mode, frame.kind()) {
            (BranchingMode::MultiBranch, MessageKind::Sequence) => {
                let sequence = absorb_sequence(&mut draft, &frame)?;
                let Some(content) = self.try_fetch_frame(&sequence.ref_link).await? else {
                    return Ok(false);
                };
                expect_publisher(&content, &me)?;
                self.absorb(&mut draft, &content, OnDenied::Yield)?;
            }
            (_, MessageKind::Keyload | MessageKind::SignedPacket | MessageKind::TaggedPacket) => {
                if mode == BranchingMode::SingleBranch && frame.header.previous != Some(cursor.link)
                {
                    return Ok(false);
                }
                self.absorb(&mut draft, &frame, OnDenied::Yield)?;
                if mode == BranchingMode::MultiBranch {
                    self.resume_sequence(&mut draft, &me, cursor, &frame).await?;
                }
            }
            _ => return Ok(false),
        }

        self.state = draft;
        tracing::warn!(%link, kind = ?frame.kind(), seq = cursor.seq, "resumed interrupted send");
        Ok(true)
    }

    /// Locate a resumed multi-branch `content` frame with its Sequence
    /// message, publishing one if the interrupted send never did.
    async fn resume_sequence(
        &self,
        draft: &mut SessionState,
        me: &Identifier,
        cursor: Cursor,
        content: &Frame,
    ) -> Result<()> {
        let link = draft.links.next_link(me, cursor.seq)?;
        if let Some(existing) = self.try_fetch_frame(&link).await? {
            let sequence = absorb_sequence(draft, &existing)?;
            if sequence.ref_link != content.link() {
                return Err(ChannelError::LinkConflict(link));
            }
            return Ok(());
        }
        let frame = self.sequence_frame(link, cursor.link, cursor.seq, content.link())?;
        draft.sequencing.advance(me, link)?;
        draft.mark_seen(link, frame.digest);
        self.transmit(&frame).await
    }

    pub(crate) async fn transmit(&self, frame: &WrappedFrame) -> Result<()> {
        let link = frame.header.link;
        match self.transport.send(&link, &frame.bytes).await? {
            SendOutcome::Stored | SendOutcome::AlreadyStored => {
                tracing::debug!(%link, kind = ?frame.header.kind, "sent frame");
                Ok(())
            }
            SendOutcome::Conflict { existing } => {
                tracing::warn!(
                    %link,
                    kind = ?frame.header.kind,
                    existing = %existing.to_hex(),
                    "link already taken"
                );
                Err(ChannelError::LinkConflict(link))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetching
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch and authenticate the frame at `link`, if any.
    pub(crate) async fn try_fetch_frame(&self, link: &Link) -> Result<Option<Frame>> {
        let Some(bytes) = self.transport.fetch(link).await? else {
            return Ok(None);
        };
        let frame = Frame::decode(&bytes, link).map_err(|e| {
            let err = ChannelError::from(e);
            if matches!(
                err,
                ChannelError::AuthenticationFailed(_) | ChannelError::LinkConflict(_)
            ) {
                tracing::warn!(%link, error = %err, "rejected frame");
            }
            err
        })?;
        tracing::debug!(%link, kind = ?frame.kind(), sender = %frame.sender(), "received frame");
        Ok(Some(frame))
    }

    pub(crate) async fn fetch_frame(&self, link: &Link) -> Result<Frame> {
        self.try_fetch_frame(link)
            .await?
            .ok_or(ChannelError::NotFound(*link))
    }

    /// The message `link` is linked to. Cursors do not move.
    pub async fn fetch_prev_msg(&self, link: &Link) -> Result<Message> {
        let frame = self.fetch_frame(link).await?;
        let previous = frame.header.previous.ok_or_else(|| {
            ChannelError::InvalidState(format!("{} is not linked to an earlier message", link))
        })?;
        let frame = self.fetch_frame(&previous).await?;
        self.peek(&frame)
    }

    /// Up to `max` messages along the links before `link`, oldest first.
    ///
    /// The walk ends early at the announcement or at a link with nothing
    /// stored. Cursors do not move.
    pub async fn fetch_prev_msgs(&self, link: &Link, max: usize) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        let mut next = self.fetch_frame(link).await?.header.previous;
        while messages.len() < max {
            let Some(link) = next else { break };
            let Some(frame) = self.try_fetch_frame(&link).await? else {
                break;
            };
            next = frame.header.previous;
            messages.push(self.peek(&frame)?);
        }
        messages.reverse();
        Ok(messages)
    }

    /// Read `frame` with the keys at hand, leaving the session as it is.
    fn peek(&self, frame: &Frame) -> Result<Message> {
        let masked = match frame.kind() {
            MessageKind::SignedPacket | MessageKind::TaggedPacket => {
                absorb_packet(&self.state, frame, OnDenied::Yield)?
            }
            MessageKind::Keyload => {
                let link = frame.link();
                let readable = self.state.session_keys.contains(&link)
                    || KeyloadPayload::from_bytes(&frame.public)?
                        .open(&link, &self.identity)
                        .is_ok();
                readable.then(Bytes::new)
            }
            _ => Some(Bytes::new()),
        };
        Ok(Message::from_frame(frame, masked))
    }

    /// Lazy walk over every tracked publisher's unread messages.
    ///
    /// Each call starts from the current cursors.
    pub fn messages(&mut self) -> MessageWalker<'_, T> {
        let max_passes = self.config.max_passes;
        MessageWalker::new(self, max_passes)
    }

    /// One pass over all tracked publishers in registration order, draining
    /// each publisher's messages in sequence order.
    pub async fn fetch_next_messages(&mut self) -> Result<Vec<Message>> {
        MessageWalker::new(self, Some(1)).collect().await
    }

    /// Repeat passes until one finds nothing (or `max_passes` is reached).
    pub async fn sync_state(&mut self) -> Result<Vec<Message>> {
        let messages = self.messages().collect().await?;
        if !messages.is_empty() {
            tracing::debug!(count = messages.len(), "synchronized channel state");
        }
        Ok(messages)
    }

    /// Read the next message of `publisher`, if one has been published.
    pub(crate) async fn fetch_next_for(&mut self, publisher: &Identifier) -> Result<Option<Message>> {
        let Some(cursor) = self.state.sequencing.cursor_for(publisher) else {
            return Ok(None);
        };
        let mode = self.state.sequencing.mode();
        let candidate = match mode {
            BranchingMode::SingleBranch => self.state.links.chain_link(&cursor.link, cursor.seq)?,
            _ => self.state.links.next_link(publisher, cursor.seq)?,
        };
        let Some(frame) = self.try_fetch_frame(&candidate).await? else {
            return Ok(None);
        };

        let mut draft = self.state.clone();
        let content = match mode {
            BranchingMode::MultiBranch => {
                expect_publisher(&frame, publisher)?;
                let sequence = absorb_sequence(&mut draft, &frame)?;
                match self.try_fetch_frame(&sequence.ref_link).await? {
                    Some(content) => content,
                    // Not visible yet; retry on a later pass.
                    None => return Ok(None),
                }
            }
            BranchingMode::SingleDepth => frame,
            BranchingMode::SingleBranch => frame,
        };
        if mode != BranchingMode::SingleBranch {
            expect_publisher(&content, publisher)?;
        }
        if content.header.seq != cursor.seq {
            return Err(ChannelError::Malformed(format!(
                "expected seq {} at {}, found {}",
                cursor.seq,
                content.link(),
                content.header.seq
            )));
        }

        let message = self.absorb(&mut draft, &content, OnDenied::Yield)?;
        self.state = draft;
        Ok(Some(message))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Receiving
    // ─────────────────────────────────────────────────────────────────────────

    /// Receive a keyload. A non-recipient fails with `NoAccess` and the
    /// session is left untouched.
    pub async fn receive_keyload(&mut self, link: &Link) -> Result<Message> {
        self.receive_content(link, MessageKind::Keyload).await
    }

    pub async fn receive_signed_packet(&mut self, link: &Link) -> Result<Message> {
        self.receive_content(link, MessageKind::SignedPacket).await
    }

    pub async fn receive_tagged_packet(&mut self, link: &Link) -> Result<Message> {
        self.receive_content(link, MessageKind::TaggedPacket).await
    }

    /// Resolve a Sequence message to the content link it announces and
    /// advance the publisher's cursor. Multi-branch channels only.
    pub async fn receive_sequence(&mut self, link: &Link) -> Result<Link> {
        if self.state.require_channel()?.branching != BranchingMode::MultiBranch {
            return Err(ChannelError::InvalidState(
                "sequence messages are only used in multi-branch channels".into(),
            ));
        }
        let frame = self.fetch_frame(link).await?;
        let mut draft = self.state.clone();
        let sequence = absorb_sequence(&mut draft, &frame)?;
        self.state = draft;
        Ok(sequence.ref_link)
    }

    /// Read message `seq` of `publisher` directly. Single-depth channels
    /// only.
    pub async fn receive_msg_by_sequence_number(
        &mut self,
        publisher: &Identifier,
        seq: u64,
    ) -> Result<Message> {
        if self.state.require_channel()?.branching != BranchingMode::SingleDepth {
            return Err(ChannelError::InvalidState(
                "random access requires a single-depth channel".into(),
            ));
        }
        let link = self.state.links.next_link(publisher, seq)?;
        let frame = self.fetch_frame(&link).await?;
        expect_publisher(&frame, publisher)?;

        let mut draft = self.state.clone();
        let message = self.absorb(&mut draft, &frame, OnDenied::Fail)?;
        self.state = draft;
        Ok(message)
    }

    /// Receive whatever message is at `link`.
    ///
    /// Sequence messages are resolved and the content they locate is
    /// returned.
    pub async fn receive_msg(&mut self, link: &Link) -> Result<Message> {
        let frame = self.fetch_frame(link).await?;
        match frame.kind() {
            MessageKind::Announce => self.apply_announcement(&frame),
            MessageKind::Subscribe => {
                self.apply_subscribe(&frame)?;
                Ok(Message::from_frame(&frame, Some(Bytes::new())))
            }
            MessageKind::Unsubscribe => {
                self.apply_unsubscribe(&frame)?;
                Ok(Message::from_frame(&frame, Some(Bytes::new())))
            }
            MessageKind::Sequence => {
                let mut draft = self.state.clone();
                let sequence = absorb_sequence(&mut draft, &frame)?;
                let content = self.fetch_frame(&sequence.ref_link).await?;
                expect_publisher(&content, &sequence.publisher)?;
                let message = self.absorb(&mut draft, &content, OnDenied::Fail)?;
                self.state = draft;
                Ok(message)
            }
            MessageKind::Keyload | MessageKind::SignedPacket | MessageKind::TaggedPacket => {
                let mut draft = self.state.clone();
                let message = self.absorb(&mut draft, &frame, OnDenied::Fail)?;
                self.state = draft;
                Ok(message)
            }
        }
    }

    async fn receive_content(&mut self, link: &Link, kind: MessageKind) -> Result<Message> {
        let frame = self.fetch_frame(link).await?;
        if frame.kind() != kind {
            return Err(ChannelError::Malformed(format!(
                "expected {:?} at {}, found {:?}",
                kind,
                link,
                frame.kind()
            )));
        }
        let mut draft = self.state.clone();
        let message = self.absorb(&mut draft, &frame, OnDenied::Fail)?;
        self.state = draft;
        Ok(message)
    }

    /// Apply a keyload or packet to `draft`.
    pub(crate) fn absorb(
        &self,
        draft: &mut SessionState,
        frame: &Frame,
        denied: OnDenied,
    ) -> Result<Message> {
        draft.require_channel()?;
        let replay = draft.check_seen(&frame.link(), &frame.digest())?;
        draft.verify_placement(&frame.header)?;

        let masked = match frame.kind() {
            MessageKind::Keyload => self.absorb_keyload(draft, frame, replay, denied)?,
            MessageKind::SignedPacket | MessageKind::TaggedPacket => {
                check_keyload_lineage(draft, frame)?;
                absorb_packet(draft, frame, denied)?
            }
            other => {
                return Err(ChannelError::Malformed(format!(
                    "{:?} is not a content message",
                    other
                )))
            }
        };

        if draft.sequencing.mode() != BranchingMode::MultiBranch {
            draft
                .sequencing
                .record(frame.sender(), frame.link(), frame.header.seq);
        }
        draft.record_keyload(&frame.header);
        draft.mark_seen(frame.link(), frame.digest());
        Ok(Message::from_frame(frame, masked))
    }

    fn absorb_keyload(
        &self,
        draft: &mut SessionState,
        frame: &Frame,
        replay: bool,
        denied: OnDenied,
    ) -> Result<Option<Bytes>> {
        let info = draft.require_channel()?;
        if frame.sender() != Identifier::Ed25519(info.author) {
            return Err(ChannelError::NotAuthorized(
                "keyload not issued by the channel author".into(),
            ));
        }
        let link = frame.link();
        let payload = KeyloadPayload::from_bytes(&frame.public)?;

        let access = if draft.session_keys.contains(&link) {
            true
        } else {
            match payload.open(&link, &self.identity) {
                Ok(key) if replay => {
                    draft.session_keys.insert(link, key);
                    true
                }
                Ok(key) => {
                    draft.session_keys.adopt(link, key);
                    tracing::info!(%link, "adopted session key");
                    true
                }
                Err(KeyloadError::NoAccess) => match denied {
                    OnDenied::Fail => {
                        return Err(ChannelError::NoAccess(format!(
                            "not a recipient of keyload {}",
                            link
                        )))
                    }
                    OnDenied::Yield => {
                        tracing::debug!(%link, "not a recipient of keyload");
                        false
                    }
                },
                Err(e) => return Err(e.into()),
            }
        };

        if !replay {
            let issued_by_me = info.author == self.public_key();
            for (public_key, exchange_key) in payload.members() {
                draft.learn_participant(public_key, exchange_key)?;
                if issued_by_me && public_key != self.public_key() {
                    draft.subscribers.insert(public_key);
                }
            }
        }

        Ok(access.then(Bytes::new))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channel lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Announce a new channel derived from this user's key and the
    /// configured channel index.
    pub(crate) async fn announce(&mut self) -> Result<Link> {
        if self.state.channel.is_some() {
            return Err(ChannelError::InvalidState("channel already announced".into()));
        }

        let mut draft = SessionState::new();
        let link = draft
            .links
            .channel_root(&self.public_key(), self.config.channel_index);
        let payload = AnnouncePayload {
            author: self.public_key(),
            exchange_key: self.exchange_public_key(),
            branching: self.config.branching,
            channel_index: self.config.channel_index,
        };
        let frame = FrameBuilder::new(MessageKind::Announce, link)
            .public(payload::encode(&payload)?)
            .build(&self.identity)?;

        draft.bind(ChannelInfo {
            id: link.channel,
            announce: link,
            author: payload.author,
            author_exchange_key: payload.exchange_key,
            branching: payload.branching,
        });
        draft.mark_seen(link, frame.digest);

        self.transmit(&frame).await?;
        self.state = draft;
        tracing::info!(%link, branching = ?payload.branching, "announced channel");
        Ok(link)
    }

    /// Bind to the channel announced by `frame`.
    pub(crate) fn apply_announcement(&mut self, frame: &Frame) -> Result<Message> {
        if frame.kind() != MessageKind::Announce {
            return Err(ChannelError::Malformed(format!(
                "expected Announce at {}, found {:?}",
                frame.link(),
                frame.kind()
            )));
        }
        let link = frame.link();
        let payload: AnnouncePayload = payload::decode(&frame.public)?;
        payload.verify(&link, &frame.sender())?;

        if let Some(info) = self.state.channel {
            if info.announce != link {
                return Err(ChannelError::InvalidState(format!(
                    "already bound to channel {}",
                    info.id
                )));
            }
            self.state.check_seen(&link, &frame.digest())?;
            return Ok(Message::from_frame(frame, Some(Bytes::new())));
        }

        let mut draft = self.state.clone();
        draft.bind(ChannelInfo {
            id: link.channel,
            announce: link,
            author: payload.author,
            author_exchange_key: payload.exchange_key,
            branching: payload.branching,
        });
        draft.mark_seen(link, frame.digest());
        self.state = draft;
        tracing::info!(%link, author = %frame.sender(), "bound to channel");
        Ok(Message::from_frame(frame, Some(Bytes::new())))
    }

    /// Accept a subscriber from its Subscribe message.
    pub(crate) fn apply_subscribe(&mut self, frame: &Frame) -> Result<Identifier> {
        self.require_authority("accept subscriptions")?;
        let info = self.state.require_channel()?;
        let subscriber = frame.sender();
        let public_key = *subscriber
            .public_key()
            .ok_or_else(|| ChannelError::Malformed("subscriber without signing key".into()))?;

        if frame.kind() != MessageKind::Subscribe
            || frame.link() != self.state.links.next_link(&subscriber, 0)?
            || frame.header.previous != Some(info.announce)
        {
            return Err(ChannelError::Malformed(format!(
                "no valid Subscribe at {}",
                frame.link()
            )));
        }
        let payload: SubscribePayload = payload::decode(&frame.public)?;

        let mut draft = self.state.clone();
        if !draft.check_seen(&frame.link(), &frame.digest())? {
            draft.add_subscriber(public_key, payload.exchange_key)?;
            draft.mark_seen(frame.link(), frame.digest());
            tracing::info!(subscriber = %subscriber, "accepted subscriber");
        }
        self.state = draft;
        Ok(subscriber)
    }

    /// Drop a subscriber on its Unsubscribe message.
    pub(crate) fn apply_unsubscribe(&mut self, frame: &Frame) -> Result<Identifier> {
        self.require_authority("process unsubscriptions")?;
        let subscriber = frame.sender();
        let public_key = *subscriber
            .public_key()
            .ok_or_else(|| ChannelError::Malformed("subscriber without signing key".into()))?;
        let registration = self.state.links.next_link(&subscriber, 0)?;

        if frame.kind() != MessageKind::Unsubscribe
            || frame.link() != self.state.links.branch_link(&registration, &subscriber, 0)?
            || frame.header.previous != Some(registration)
        {
            return Err(ChannelError::Malformed(format!(
                "no valid Unsubscribe at {}",
                frame.link()
            )));
        }

        let mut draft = self.state.clone();
        if !draft.check_seen(&frame.link(), &frame.digest())? {
            draft.subscribers.remove(&public_key);
            draft.mark_seen(frame.link(), frame.digest());
            tracing::info!(subscriber = %subscriber, "removed subscriber");
        }
        self.state = draft;
        Ok(subscriber)
    }

    pub(crate) fn require_authority(&self, action: &str) -> Result<()> {
        self.state.require_channel()?;
        if self.is_channel_author() {
            Ok(())
        } else {
            Err(ChannelError::NotAuthorized(format!(
                "only the channel author may {}",
                action
            )))
        }
    }

    /// Forget the channel; identity and PSKs are kept.
    pub(crate) fn purge(&mut self) {
        self.state = SessionState::new();
    }
}

/// Pick the address of the next message of `me` and advance its cursor.
fn place(draft: &mut SessionState, me: &Identifier, link_to: &Link) -> Result<Placement> {
    let info = draft.require_channel()?;
    if link_to.channel != info.id {
        return Err(ChannelError::InvalidState(format!(
            "{} is not part of channel {}",
            link_to, info.id
        )));
    }
    if !draft.sequencing.contains(me) {
        draft.track(*me)?;
    }
    let cursor = draft
        .sequencing
        .cursor_for(me)
        .ok_or_else(|| ChannelError::InvalidState(format!("no cursor for {}", me)))?;
    let seq = cursor.seq;

    let placement = match info.branching {
        BranchingMode::SingleBranch => {
            let link = draft.links.chain_link(&cursor.link, seq)?;
            draft.sequencing.advance(me, link)?;
            Placement {
                link,
                previous: cursor.link,
                seq,
                sequence: None,
            }
        }
        BranchingMode::MultiBranch => {
            let link = draft.links.branch_link(link_to, me, seq)?;
            let sequence_link = draft.links.next_link(me, seq)?;
            draft.sequencing.advance(me, sequence_link)?;
            Placement {
                link,
                previous: *link_to,
                seq,
                sequence: Some((sequence_link, cursor.link)),
            }
        }
        BranchingMode::SingleDepth => {
            let link = draft.links.next_link(me, seq)?;
            draft.sequencing.advance(me, link)?;
            Placement {
                link,
                previous: *link_to,
                seq,
                sequence: None,
            }
        }
    };
    Ok(placement)
}

/// Validate a Sequence message and advance its publisher's cursor.
fn absorb_sequence(draft: &mut SessionState, frame: &Frame) -> Result<SequencePayload> {
    let info = draft.require_channel()?;
    if frame.kind() != MessageKind::Sequence {
        return Err(ChannelError::Malformed(format!(
            "expected Sequence at {}, found {:?}",
            frame.link(),
            frame.kind()
        )));
    }
    draft.check_seen(&frame.link(), &frame.digest())?;

    let payload: SequencePayload = payload::decode(&frame.public)?;
    let expected = draft.links.next_link(&payload.publisher, payload.seq)?;
    if payload.publisher != frame.sender()
        || payload.seq != frame.header.seq
        || expected != frame.link()
        || payload.ref_link.channel != info.id
    {
        return Err(ChannelError::Malformed(format!(
            "inconsistent Sequence at {}",
            frame.link()
        )));
    }

    draft
        .sequencing
        .record(payload.publisher, frame.link(), payload.seq);
    draft.mark_seen(frame.link(), frame.digest());
    Ok(payload)
}

/// A packet linked to a known message must be sealed under the keyload
/// that governs it. Single-branch packets link to the channel tip rather
/// than a chosen message, so they are not checked.
fn check_keyload_lineage(draft: &SessionState, frame: &Frame) -> Result<()> {
    if draft.sequencing.mode() == BranchingMode::SingleBranch {
        return Ok(());
    }
    let Some(governing) = frame.header.previous.and_then(|p| draft.keyloads.get(&p)) else {
        return Ok(());
    };
    if frame.header.keyload != Some(*governing) {
        return Err(ChannelError::Malformed(format!(
            "{} is not sealed under keyload {} of the message it links to",
            frame.link(),
            governing
        )));
    }
    Ok(())
}

fn absorb_packet(draft: &SessionState, frame: &Frame, denied: OnDenied) -> Result<Option<Bytes>> {
    if !frame.header.encrypted {
        return Ok(Some(Bytes::new()));
    }
    let keyload = frame
        .header
        .keyload
        .ok_or_else(|| ChannelError::Malformed("encrypted frame without keyload".into()))?;
    match draft.session_keys.get(&keyload) {
        Some(key) => Ok(Some(frame.open_masked(key).map_err(|e| {
            tracing::warn!(link = %frame.link(), "masked payload failed authentication");
            ChannelError::from(e)
        })?)),
        None => match denied {
            OnDenied::Fail => Err(ChannelError::NoAccess(format!(
                "no session key for keyload {}",
                keyload
            ))),
            OnDenied::Yield => Ok(None),
        },
    }
}

fn expect_publisher(frame: &Frame, publisher: &Identifier) -> Result<()> {
    if frame.sender() != *publisher {
        tracing::warn!(link = %frame.link(), sender = %frame.sender(), expected = %publisher, "frame in another publisher's slot");
        return Err(ChannelError::AuthenticationFailed(format!(
            "{} holds a frame from {} instead of {}",
            frame.link(),
            frame.sender(),
            publisher
        )));
    }
    Ok(())
}
