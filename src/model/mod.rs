//! Domain entities held by the entity store

mod comment;
mod member;
mod notification;
mod post;
mod vote;

pub use comment::Comment;
pub use member::{Member, MemberRole};
pub use notification::{
    AwardPayload, FollowPayload, InvitePayload, MentionPayload, ModActionPayload, Notification,
    NotificationData, NotificationKind, ReplyPayload, SystemPayload, WireNotification,
};
pub use post::{Post, PostPatch};
pub use vote::{VoteAction, VoteDirection, VotePatch, VoteState, Votable};
