// src/checker/html.rs
// =============================================================================
// This module pulls the title and the links out of an HTML page.
//
// Unlike a DOM parser, we never build a tree. The page is fed through
// html5ever's tokenizer chunk by chunk as it arrives from the network, and
// we react to each token:
//
//   <title> ... </title>     text inside goes to the page title
//   <a href="..."> ... </a>  a new Link; text inside goes to its display text
//   <script>, <style>        contents are raw text, never markup
//
// Text is collected into "runs" (everything between two tags). Each run is
// trimmed before it is appended, so "<title>\n  Home  \n</title>" gives
// "Home".
//
// Broken or truncated markup is fine: the tokenizer recovers from most
// errors on its own, and if the body stops early we return whatever we had.
// =============================================================================

use std::mem;

use bytes::Bytes;
use encoding_rs::{Decoder, Encoding, UTF_8};
use futures::StreamExt;
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use tokio::sync::mpsc;

use super::classify::LinkClassifier;
use super::http::{charset, BodyStream};
use crate::graph::Link;

// How many body chunks may wait for the tokenizer thread
const CHUNK_BUFFER: usize = 16;

/// What we learned from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub links: Vec<Link>,
}

/// Receives tokens from html5ever and builds up the title and links.
struct PageSink {
    classifier: LinkClassifier,
    title: String,
    links: Vec<Link>,
    // Name of the most recent start tag
    context: String,
    in_title: bool,
    // Index into `links` of the anchor we are inside of
    current_link: Option<usize>,
    // Text seen since the last tag
    run: String,
}

impl PageSink {
    fn new(classifier: LinkClassifier) -> Self {
        Self {
            classifier,
            title: String::new(),
            links: Vec::new(),
            context: String::new(),
            in_title: false,
            current_link: None,
            run: String::new(),
        }
    }

    fn flush_text(&mut self) {
        if self.run.is_empty() {
            return;
        }
        let text = self.run.trim();
        if self.in_title {
            self.title.push_str(text);
        } else if let Some(index) = self.current_link {
            self.links[index].text.push_str(text);
        }
        self.run.clear();
    }

    fn start_tag(&mut self, tag: Tag) -> TokenSinkResult<()> {
        self.context.clear();
        self.context.push_str(&tag.name);

        match self.context.as_str() {
            "title" => {
                self.in_title = true;
                TokenSinkResult::RawData(RawKind::Rcdata)
            }
            "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
            "script" => TokenSinkResult::RawData(RawKind::ScriptData),
            "style" | "xmp" | "iframe" | "noembed" | "noframes" => {
                TokenSinkResult::RawData(RawKind::Rawtext)
            }
            "a" => {
                self.start_anchor(&tag);
                TokenSinkResult::Continue
            }
            _ => TokenSinkResult::Continue,
        }
    }

    fn start_anchor(&mut self, tag: &Tag) {
        // Attribute names arrive lower-cased, so HREF matches too
        let href = tag.attrs.iter().find(|attr| &*attr.name.local == "href");

        self.current_link = href.map(|attr| {
            self.links.push(self.classifier.classify(&attr.value));
            self.links.len() - 1
        });
    }

    fn end_tag(&mut self, tag: Tag) {
        match &*tag.name {
            "title" => self.in_title = false,
            "a" => self.current_link = None,
            _ => {}
        }
    }
}

impl TokenSink for PageSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::CharacterTokens(text) => {
                self.run.push_str(&text);
                TokenSinkResult::Continue
            }
            // Recoverable, the tokenizer carries on by itself
            Token::ParseError(_) | Token::NullCharacterToken => TokenSinkResult::Continue,
            Token::TagToken(tag) => {
                self.flush_text();
                match tag.kind {
                    TagKind::StartTag => self.start_tag(tag),
                    TagKind::EndTag => {
                        self.end_tag(tag);
                        TokenSinkResult::Continue
                    }
                }
            }
            Token::CommentToken(_) | Token::DoctypeToken(_) | Token::EOFToken => {
                self.flush_text();
                TokenSinkResult::Continue
            }
        }
    }
}

/// Incremental extractor: feed it bytes as they arrive, then `finish`.
///
/// Not `Send` (html5ever's buffers aren't), so keep it on one thread.
pub struct StreamExtractor {
    tokenizer: Tokenizer<PageSink>,
    input: BufferQueue,
    decoder: Decoder,
}

impl StreamExtractor {
    pub fn new(classifier: LinkClassifier, encoding: &'static Encoding) -> Self {
        Self {
            tokenizer: Tokenizer::new(PageSink::new(classifier), TokenizerOpts::default()),
            input: BufferQueue::new(),
            // new_decoder() also honours a byte order mark if there is one
            decoder: encoding.new_decoder(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.decode(bytes, false);
    }

    pub fn finish(mut self) -> Extracted {
        self.decode(&[], true);
        self.tokenizer.end();

        let sink = &mut self.tokenizer.sink;
        Extracted {
            title: mem::take(&mut sink.title),
            links: mem::take(&mut sink.links),
        }
    }

    fn decode(&mut self, bytes: &[u8], last: bool) {
        // A chunk may end in the middle of a multi-byte character; the
        // decoder keeps the partial bytes until the next call
        let capacity = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 16);
        let mut text = String::with_capacity(capacity);
        let _ = self.decoder.decode_to_string(bytes, &mut text, last);

        if !text.is_empty() {
            self.input.push_back(StrTendril::from_slice(&text));
            let _ = self.tokenizer.feed(&mut self.input);
        }
    }
}

/// Picks the text encoding from a Content-Type header, defaulting to UTF-8.
pub fn encoding_for(content_type: Option<&str>) -> &'static Encoding {
    content_type
        .and_then(charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8)
}

/// Extracts title and links from a complete document already in memory.
pub fn extract_html(html: &str, classifier: LinkClassifier) -> Extracted {
    let mut extractor = StreamExtractor::new(classifier, UTF_8);
    extractor.feed(html.as_bytes());
    extractor.finish()
}

/// Extracts title and links from a response body while it downloads.
///
/// The tokenizer runs on a blocking thread and gets the chunks through a
/// channel. If reading the body fails we stop there and keep what we have.
pub async fn extract_page(
    mut body: BodyStream,
    classifier: LinkClassifier,
    content_type: Option<&str>,
) -> Extracted {
    let encoding = encoding_for(content_type);
    let page_url = classifier.base().to_string();
    let (tx, mut rx) = mpsc::channel::<Bytes>(CHUNK_BUFFER);

    let tokenizer = tokio::task::spawn_blocking(move || {
        let mut extractor = StreamExtractor::new(classifier, encoding);
        while let Some(chunk) = rx.blocking_recv() {
            extractor.feed(&chunk);
        }
        extractor.finish()
    });

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                if tx.send(bytes).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Stopped reading {} early: {}", page_url, e);
                break;
            }
        }
    }
    // Closing the channel lets the tokenizer thread finish up
    drop(tx);

    match tokenizer.await {
        Ok(extracted) => extracted,
        Err(e) => {
            log::error!("HTML extraction for {} failed: {}", page_url, e);
            Extracted::default()
        }
    }
}
