//! Cross-module token-chain behavior: block chaining through the wallet and
//! local signing of persisted blocks.

use std::collections::BTreeMap;

use dtln_chain::{
    Block, DidCrypto, Ed25519Did, MemoryWallet, TokenChainBlock, TokenInfo, TokenStatus,
    TokenType, TokenWallet, TransInfo, TransTokens, TOKEN_GENERATED, TOKEN_TRANSFERRED,
};

fn tcb(tokens: &[&str], trans_type: &str, owner: &str) -> TokenChainBlock {
    TokenChainBlock {
        transaction_type: trans_type.to_string(),
        token_owner: owner.to_string(),
        trans_info: TransInfo {
            tokens: tokens
                .iter()
                .map(|t| TransTokens {
                    token: (*t).to_string(),
                    token_type: TokenType::Rbt,
                    commited_did: None,
                })
                .collect(),
            ..TransInfo::default()
        },
        ..TokenChainBlock::default()
    }
}

fn latest_map(wallet: &MemoryWallet, tokens: &[&str]) -> BTreeMap<String, Option<Block>> {
    tokens
        .iter()
        .map(|t| {
            (
                (*t).to_string(),
                wallet.latest_block(t, TokenType::Rbt),
            )
        })
        .collect()
}

#[test]
fn test_chain_grows_through_wallet() {
    let wallet = MemoryWallet::new();
    wallet.register_did("did-a");
    wallet.add_token("t1", TokenType::Rbt, 1.0, "did-a");

    let genesis = Block::create_new(
        &latest_map(&wallet, &["t1"]),
        tcb(&["t1"], TOKEN_GENERATED, "did-a"),
    )
    .expect("genesis");
    wallet.add_token_block("t1", &genesis).expect("append");

    let next = Block::create_new(
        &latest_map(&wallet, &["t1"]),
        tcb(&["t1"], TOKEN_TRANSFERRED, "did-b"),
    )
    .expect("next");
    wallet.add_token_block("t1", &next).expect("append");

    let chain = wallet.chain("t1");
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].height_of("t1"), Some(0));
    assert_eq!(chain[1].height_of("t1"), Some(1));
    assert_eq!(
        chain[1].prev_block_id("t1"),
        Some(chain[0].block_id("t1").expect("id").as_str())
    );
}

#[test]
fn test_shared_block_across_token_chains() {
    let wallet = MemoryWallet::new();
    wallet.register_did("did-a");
    for t in ["t1", "t2"] {
        wallet.add_token(t, TokenType::Rbt, 1.0, "did-a");
        let genesis = Block::create_new(
            &latest_map(&wallet, &[t]),
            tcb(&[t], TOKEN_GENERATED, "did-a"),
        )
        .expect("genesis");
        wallet.add_token_block(t, &genesis).expect("append");
    }

    // One transfer block covering both tokens lands on both chains with
    // independent per-token heights.
    let transfer = Block::create_new(
        &latest_map(&wallet, &["t1", "t2"]),
        tcb(&["t1", "t2"], TOKEN_TRANSFERRED, "did-b"),
    )
    .expect("transfer");
    let info = vec![
        TokenInfo {
            token: "t1".to_string(),
            token_type: TokenType::Rbt,
            token_value: 1.0,
            owner_did: "did-a".to_string(),
        },
        TokenInfo {
            token: "t2".to_string(),
            token_type: TokenType::Rbt,
            token_value: 1.0,
            owner_did: "did-a".to_string(),
        },
    ];
    wallet
        .tokens_transferred("did-a", &info, &transfer)
        .expect("transfer");

    for t in ["t1", "t2"] {
        let chain = wallet.chain(t);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].height_of(t), Some(1));
        assert_eq!(wallet.token_status(t), Some(TokenStatus::Transferred));
    }
    assert_ne!(
        transfer.block_id("t1").expect("id"),
        transfer.block_id("t2").expect("id")
    );
}

#[test]
fn test_persisted_block_round_trips_with_signature() {
    let wallet = MemoryWallet::new();
    wallet.add_token("t1", TokenType::Rbt, 1.0, "did-a");
    let dc = Ed25519Did::from_seed("did-a", [5u8; 32]).expect("did");

    let mut block = Block::create_new(
        &latest_map(&wallet, &["t1"]),
        tcb(&["t1"], TOKEN_GENERATED, "did-a"),
    )
    .expect("block");
    block.sign_with(&dc).expect("sign");
    wallet.create_token_block(&block).expect("persist");

    let stored = wallet.chain("t1").pop().expect("stored");
    let bytes = stored.to_bytes().expect("bytes");
    let decoded = Block::from_bytes(&bytes).expect("decode");
    assert_eq!(decoded, stored);

    let sig_hex = decoded.signature_of("did-a").expect("signature");
    let sig = hex::decode(sig_hex).expect("hex");
    assert!(dc
        .verify(decoded.hash().as_bytes(), &sig)
        .expect("verify"));
}
