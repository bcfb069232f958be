use super::Member;
use crate::{DynamiteError, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A point on the ring.
pub type Token = u128;

/// How a member's tokens are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStrategy {
    /// MD5 of `"{member}-{index}"`. Every process computes the same ring.
    #[default]
    Deterministic,
    /// Uniform over the whole 128-bit space. Only valid for a single process.
    Randomized,
}

/// Hash a string onto the ring: the MD5 digest read as a big-endian `u128`.
pub fn hash_token(input: &str) -> Token {
    let digest = Md5::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    u128::from_be_bytes(bytes)
}

fn generate_tokens(member: &Member, replicas: usize, strategy: TokenStrategy) -> Vec<Token> {
    match strategy {
        TokenStrategy::Deterministic => (0..replicas)
            .map(|index| hash_token(&format!("{}-{}", member, index)))
            .collect(),
        TokenStrategy::Randomized => (0..replicas).map(|_| rand::random::<u128>()).collect(),
    }
}

/// Consistent hash ring with virtual nodes.
///
/// `sorted_tokens` and `owners` always hold the same token set; `member_tokens`
/// is the reverse index used by `remove`.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    sorted_tokens: Vec<Token>,
    owners: HashMap<Token, Member>,
    member_tokens: HashMap<Member, Vec<Token>>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `member` with `replicas` tokens.
    ///
    /// All tokens are validated before any is inserted, so a failed add leaves
    /// the ring untouched.
    pub fn add(&mut self, member: &Member, replicas: usize, strategy: TokenStrategy) -> Result<()> {
        if self.member_tokens.contains_key(member) {
            return Err(DynamiteError::DuplicateMember(member.to_string()));
        }
        if replicas == 0 {
            return Err(DynamiteError::InvalidRequest(format!(
                "member {} needs at least one token",
                member
            )));
        }

        let tokens = generate_tokens(member, replicas, strategy);

        let mut fresh = HashSet::with_capacity(tokens.len());
        for token in &tokens {
            if self.owners.contains_key(token) || !fresh.insert(*token) {
                return Err(DynamiteError::DuplicateToken {
                    token: *token,
                    member: member.to_string(),
                });
            }
        }

        for token in &tokens {
            if let Err(pos) = self.sorted_tokens.binary_search(token) {
                self.sorted_tokens.insert(pos, *token);
            }
            self.owners.insert(*token, member.clone());
        }
        self.member_tokens.insert(member.clone(), tokens);

        tracing::debug!(
            "Added member {} to ring ({} tokens total)",
            member,
            self.sorted_tokens.len()
        );
        Ok(())
    }

    /// Drop every token owned by `member`.
    pub fn remove(&mut self, member: &Member) -> Result<()> {
        let tokens = self
            .member_tokens
            .remove(member)
            .ok_or_else(|| DynamiteError::UnknownMember(member.to_string()))?;

        for token in tokens {
            self.owners.remove(&token);
            if let Ok(pos) = self.sorted_tokens.binary_search(&token) {
                self.sorted_tokens.remove(pos);
            }
        }

        tracing::debug!(
            "Removed member {} from ring ({} tokens left)",
            member,
            self.sorted_tokens.len()
        );
        Ok(())
    }

    /// Find the member owning `key`.
    pub fn locate(&self, key: &str) -> Result<&Member> {
        if self.sorted_tokens.is_empty() {
            return Err(DynamiteError::EmptyRing(format!("cannot locate key {}", key)));
        }

        let token = self.sorted_tokens[self.position(self.token_for(key))];
        self.owners.get(&token).ok_or_else(|| {
            DynamiteError::Internal(format!("token {:032x} has no owner", token))
        })
    }

    /// Where `key` hashes to on the ring.
    pub fn token_for(&self, key: &str) -> Token {
        hash_token(key)
    }

    /// Index of the first token `>= hash`, wrapping to 0 past the end.
    fn position(&self, hash: Token) -> usize {
        let pos = self.sorted_tokens.partition_point(|token| *token < hash);
        if pos == self.sorted_tokens.len() { 0 } else { pos }
    }

    /// Total number of tokens (virtual nodes) on the ring.
    pub fn size(&self) -> usize {
        self.sorted_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_tokens.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.member_tokens.len()
    }

    /// Members in sorted order.
    pub fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.member_tokens.keys().cloned().collect();
        members.sort();
        members
    }

    pub fn contains(&self, member: &Member) -> bool {
        self.member_tokens.contains_key(member)
    }

    pub fn tokens_of(&self, member: &Member) -> Option<&[Token]> {
        self.member_tokens.get(member).map(Vec::as_slice)
    }

    pub fn sorted_tokens(&self) -> &[Token] {
        &self.sorted_tokens
    }

    /// The sorted token list and the owner map agree exactly.
    pub fn is_consistent(&self) -> bool {
        let mut owned: Vec<Token> = self.owners.keys().copied().collect();
        owned.sort_unstable();

        let indexed: usize = self.member_tokens.values().map(Vec::len).sum();

        owned == self.sorted_tokens
            && indexed == self.sorted_tokens.len()
            && self.sorted_tokens.windows(2).all(|pair| pair[0] < pair[1])
    }
}
