//! # Lingua Tutor
//!
//! A single-session conversational vocabulary tutor backed by a local
//! knowledge corpus.
//!
//! The tutor keeps a content-addressed semantic index of a directory of
//! study notes in SQLite. At startup the index is synchronized against the
//! corpus by fingerprint, so unchanged notes cost nothing and edited notes
//! trigger a full rebuild. During the session each user turn is classified
//! and routed: definition questions are answered from retrieved snippets,
//! registration requests run a strict structured extraction and persist a
//! vocabulary record, and everything else is plain conversation with the
//! tutor persona.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Corpus   │──▶│ Fingerprint  │──▶│  SQLite    │
//! │ (notes)  │   │ Chunk+Embed  │   │ vectors   │
//! └──────────┘   └──────────────┘   └────┬──────┘
//!                                        │ retrieve
//!                ┌───────────────────────┤
//!                ▼                       ▼
//!           ┌──────────┐          ┌──────────┐
//!           │ Dialogue │─────────▶│  Record   │
//!           │  engine  │  extract │  store    │
//!           └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lingua init                    # create database
//! lingua sync                    # index the knowledge directory
//! lingua query "hello"           # inspect what retrieval returns
//! lingua chat                    # start a tutoring session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Knowledge directory loading |
//! | [`fingerprint`] | Content-addressed corpus fingerprints |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Fingerprint-gated index sync and retrieval |
//! | [`intent`] | Utterance classification and term extraction |
//! | [`extract`] | Structured vocabulary-record extraction |
//! | [`dialogue`] | Turn state machine |
//! | [`record_store`] | Vocabulary record persistence |
//! | [`chat`] | Interactive session loop |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod db;
pub mod dialogue;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod index;
pub mod intent;
pub mod migrate;
pub mod model;
pub mod record_store;
pub mod session;
