use std::path::Path;

use crate::maps::{self, MapProvider};
use crate::storage::blob_store::BlobStore;
use crate::upstream::{ContactId, Me, Message, Participant};

/// Placeholder for media that could not be stored.
pub const MISSING_FILE: &str = "--file--";

/// Render the text the IRC client sees for `msg`.
///
/// Locations become a map link, media becomes the stored file's URL (plus
/// caption), anything else is the message text with mentions resolved.
pub async fn message_body(
    msg: &Message,
    participants: &[Participant],
    me: &Me,
    blobs: &dyn BlobStore,
    map_provider: MapProvider,
) -> String {
    if let Some(location) = msg.location {
        return maps::by_provider(map_provider, location.latitude, location.longitude);
    }

    if let Some(media) = &msg.media {
        let mut body = match blobs.get_file_by_hash(&media.file_hash).await {
            Some(file) => file.url,
            None => MISSING_FILE.to_string(),
        };
        if !media.caption.is_empty() {
            body.push(' ');
            body.push_str(&resolve_mentions(
                &media.caption,
                &msg.mentioned_ids,
                participants,
                me,
            ));
        }
        return body;
    }

    resolve_mentions(&msg.body, &msg.mentioned_ids, participants, me)
}

/// Replace `@<number>` mentions with the mentioned participant's name. A
/// mention of the local user becomes their own display name.
pub fn resolve_mentions(
    text: &str,
    mentioned: &[ContactId],
    participants: &[Participant],
    me: &Me,
) -> String {
    let mut out = text.to_string();
    for id in mentioned {
        let name = if *id == me.self_id {
            me.push_name.clone()
        } else if let Some(p) = participants.iter().find(|p| p.id == *id) {
            p.safe_name()
        } else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        out = replace_mention(&out, &id.user, &name);
    }
    out
}

/// Replace every `@user` that is not the start of a longer token.
fn replace_mention(text: &str, user: &str, name: &str) -> String {
    let pattern = format!("@{}", user);
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(&pattern) {
        let end = pos + pattern.len();
        let continues = rest[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        out.push_str(&rest[..pos]);
        if continues {
            out.push_str(&pattern);
        } else {
            out.push('@');
            out.push_str(name);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// File extension for downloaded media: from the MIME type, else from the
/// content's magic bytes, else from the original file name. Empty if all fail.
pub fn media_extension(mime_type: &str, bytes: &[u8], filename: &str) -> String {
    if let Some(ext) = extension_by_mime(mime_type).or_else(|| extension_by_bytes(bytes)) {
        return ext.to_string();
    }
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

fn extension_by_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next()?.trim().to_ascii_lowercase();
    let ext = match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/aac" => "aac",
        "audio/amr" => "amr",
        "video/mp4" => "mp4",
        "video/3gpp" => "3gp",
        "video/quicktime" => "mov",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "text/plain" => "txt",
        "text/vcard" | "text/x-vcard" => "vcf",
        _ => return None,
    };
    Some(ext)
}

fn extension_by_bytes(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpg"),
        [0x89, b'P', b'N', b'G', ..] => Some("png"),
        [b'G', b'I', b'F', b'8', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        [b'%', b'P', b'D', b'F', ..] => Some("pdf"),
        [b'O', b'g', b'g', b'S', ..] => Some("ogg"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some("mp4"),
        _ => None,
    }
}
