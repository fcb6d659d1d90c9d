#![allow(clippy::unwrap_used)]

mod common;

use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::Amount;
use common::invoice_for_hash;
use common::keypair;
use common::setup;
use common::txid;
use common::Setup;
use nautilus_service::nursery::ChainEvent;
use nautilus_service::nursery::LightningEvent;
use nautilus_service::nursery::TransactionOutput;
use nautilus_service::Error;
use nautilus_service::SwapRepository;
use nautilus_service::SwapStatus;
use nautilus_service::SwapStatusUpdate;
use nautilus_service::SwapVersion;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;

fn drain(rx: &mut broadcast::Receiver<SwapStatusUpdate>) -> Vec<SwapStatus> {
    let mut statuses = Vec::new();
    while let Ok(update) = rx.try_recv() {
        statuses.push(update.status);
    }
    statuses
}

fn lockup_event(address: &str, amount: Amount, confirmed: bool) -> ChainEvent {
    ChainEvent::Transaction {
        symbol: "BTC".to_string(),
        transaction_id: txid(0x01),
        outputs: vec![TransactionOutput {
            address: address.to_string(),
            amount,
        }],
        confirmed,
    }
}

#[tokio::test]
async fn submarine_happy_path() {
    let ctx = setup(Setup::default());
    let mut events = ctx.service.subscribe();

    let preimage = [0x11; 32];
    let preimage_hash = sha256::Hash::hash(&preimage);
    let invoice = invoice_for_hash(preimage_hash, 100_000_000);
    let user = keypair(0x01);

    let created = ctx
        .service
        .create_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            user.public_key(),
        )
        .await
        .unwrap();

    // rate 1.0, base fee 500, percentage fee 1000.
    assert_eq!(created.expected_amount, Amount::from_sat(101_500));
    // Current height plus the minimal swap delta of 24 blocks.
    assert_eq!(created.timeout_block_height, 1_024);
    assert!(created.bip21.starts_with(&format!(
        "bitcoin:{}?amount=0.001015",
        created.address
    )));

    *ctx.lnd.payment_preimage.lock().unwrap() = Some(preimage);

    let nursery = ctx.service.nursery();

    // Mempool acceptance alone does not trigger the payment without
    // zero-conf.
    nursery
        .handle_chain_event(lockup_event(&created.address, created.expected_amount, false))
        .await;
    assert_eq!(ctx.lnd.pay_calls.load(Ordering::SeqCst), 0);

    nursery
        .handle_chain_event(lockup_event(&created.address, created.expected_amount, true))
        .await;

    let swap = ctx
        .repository
        .get_submarine(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionClaimed);
    assert_eq!(swap.preimage, Some(preimage));
    assert_eq!(swap.lockup_transaction_id, Some(txid(0x01)));
    assert_eq!(swap.onchain_amount, Some(created.expected_amount));

    assert_eq!(ctx.lnd.pay_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.wallet.claims.lock().unwrap().len(), 1);

    assert_eq!(
        drain(&mut events),
        vec![
            SwapStatus::SwapCreated,
            SwapStatus::TransactionMempool,
            SwapStatus::TransactionConfirmed,
            SwapStatus::InvoicePending,
            SwapStatus::InvoicePaid,
            SwapStatus::TransactionClaimed,
        ]
    );
}

#[tokio::test]
async fn submarine_zero_conf_pays_from_mempool() {
    let ctx = setup(Setup {
        zero_conf: true,
        ..Setup::default()
    });

    let preimage = [0x12; 32];
    let invoice = invoice_for_hash(sha256::Hash::hash(&preimage), 50_000_000);

    let created = ctx
        .service
        .create_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x01).public_key(),
        )
        .await
        .unwrap();
    assert!(created.accept_zero_conf);

    *ctx.lnd.payment_preimage.lock().unwrap() = Some(preimage);

    ctx.service
        .nursery()
        .handle_chain_event(lockup_event(&created.address, created.expected_amount, false))
        .await;

    let swap = ctx
        .repository
        .get_submarine(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionClaimed);
}

#[tokio::test]
async fn submarine_event_redelivery_is_idempotent() {
    let ctx = setup(Setup::default());

    let preimage = [0x13; 32];
    let invoice = invoice_for_hash(sha256::Hash::hash(&preimage), 25_000_000);

    let created = ctx
        .service
        .create_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x01).public_key(),
        )
        .await
        .unwrap();

    *ctx.lnd.payment_preimage.lock().unwrap() = Some(preimage);

    let nursery = ctx.service.nursery();
    let event = lockup_event(&created.address, created.expected_amount, true);

    nursery.handle_chain_event(event.clone()).await;
    nursery.handle_chain_event(event).await;

    let swap = ctx
        .repository
        .get_submarine(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionClaimed);

    // The invoice was paid and the lockup claimed exactly once.
    assert_eq!(ctx.lnd.pay_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.wallet.claims.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn submarine_underpaid_lockup_keeps_watching() {
    let ctx = setup(Setup::default());
    let mut events = ctx.service.subscribe();

    let preimage = [0x14; 32];
    let invoice = invoice_for_hash(sha256::Hash::hash(&preimage), 100_000_000);

    let created = ctx
        .service
        .create_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x01).public_key(),
        )
        .await
        .unwrap();

    *ctx.lnd.payment_preimage.lock().unwrap() = Some(preimage);

    let nursery = ctx.service.nursery();

    nursery
        .handle_chain_event(lockup_event(
            &created.address,
            created.expected_amount - Amount::from_sat(1),
            true,
        ))
        .await;

    let swap = ctx
        .repository
        .get_submarine(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionLockupFailed);
    assert_eq!(ctx.lnd.pay_calls.load(Ordering::SeqCst), 0);

    // A proper lockup afterwards completes the swap.
    nursery
        .handle_chain_event(lockup_event(&created.address, created.expected_amount, true))
        .await;

    let swap = ctx
        .repository
        .get_submarine(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionClaimed);

    let statuses = drain(&mut events);
    assert_eq!(statuses[0], SwapStatus::SwapCreated);
    assert_eq!(statuses[1], SwapStatus::TransactionLockupFailed);
    assert_eq!(*statuses.last().unwrap(), SwapStatus::TransactionClaimed);
}

#[tokio::test]
async fn submarine_payment_failure_is_recorded() {
    let ctx = setup(Setup::default());

    let invoice = invoice_for_hash(sha256::Hash::hash(&[0x15; 32]), 10_000_000);

    let created = ctx
        .service
        .create_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x01).public_key(),
        )
        .await
        .unwrap();

    // No preimage configured: the payment fails.
    ctx.service
        .nursery()
        .handle_chain_event(lockup_event(&created.address, created.expected_amount, true))
        .await;

    let swap = ctx
        .repository
        .get_submarine(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::InvoiceFailedToPay);
    assert!(ctx.wallet.claims.lock().unwrap().is_empty());
}

#[tokio::test]
async fn submarine_expiry_refunds_the_lockup() {
    let ctx = setup(Setup::default());

    let invoice = invoice_for_hash(sha256::Hash::hash(&[0x16; 32]), 10_000_000);

    let created = ctx
        .service
        .create_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x01).public_key(),
        )
        .await
        .unwrap();

    let nursery = ctx.service.nursery();

    // The lockup arrives but the payment never succeeds.
    nursery
        .handle_chain_event(lockup_event(&created.address, created.expected_amount, false))
        .await;

    nursery
        .handle_chain_event(ChainEvent::Block {
            symbol: "BTC".to_string(),
            height: created.timeout_block_height,
        })
        .await;

    let swap = ctx
        .repository
        .get_submarine(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionRefunded);
    assert_eq!(ctx.wallet.refunds.lock().unwrap().len(), 1);

    // Another block does not refund twice.
    nursery
        .handle_chain_event(ChainEvent::Block {
            symbol: "BTC".to_string(),
            height: created.timeout_block_height + 1,
        })
        .await;
    assert_eq!(ctx.wallet.refunds.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_invoice_is_rejected() {
    let ctx = setup(Setup::default());

    let invoice = invoice_for_hash(sha256::Hash::hash(&[0x17; 32]), 10_000_000);

    ctx.service
        .create_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x01).public_key(),
        )
        .await
        .unwrap();

    let result = ctx
        .service
        .create_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x02).public_key(),
        )
        .await;

    assert!(matches!(result, Err(Error::SwapWithInvoiceExists)));
}

#[tokio::test]
async fn unknown_pair_and_side_are_rejected() {
    let ctx = setup(Setup::default());
    let invoice = invoice_for_hash(sha256::Hash::hash(&[0x18; 32]), 10_000_000);

    let result = ctx
        .service
        .create_swap(
            "DOGE/BTC",
            "buy",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x01).public_key(),
        )
        .await;
    assert!(matches!(result, Err(Error::PairNotFound(_))));

    let result = ctx
        .service
        .create_swap(
            "BTC/BTC",
            "hodl",
            SwapVersion::Taproot,
            &invoice.to_string(),
            keypair(0x01).public_key(),
        )
        .await;
    assert!(matches!(result, Err(Error::OrderSideNotFound(_))));
}

#[tokio::test]
async fn reverse_swap_flow() {
    let ctx = setup(Setup {
        rate: 0.99,
        ..Setup::default()
    });
    let mut events = ctx.service.subscribe();

    let preimage = [0x21; 32];
    let preimage_hash = sha256::Hash::hash(&preimage);

    let created = ctx
        .service
        .create_reverse_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(100_000),
            &preimage_hash.to_string(),
            keypair(0x02).public_key(),
        )
        .await
        .unwrap();

    // floor(100 000 * 0.99) - (500 + 1000) = 97 500.
    assert_eq!(created.onchain_amount, Amount::from_sat(97_500));

    let nursery = ctx.service.nursery();

    // Our lockup confirms.
    nursery
        .handle_chain_event(ChainEvent::Transaction {
            symbol: "BTC".to_string(),
            transaction_id: created.transaction_id,
            outputs: vec![TransactionOutput {
                address: created.lockup_address.clone(),
                amount: created.onchain_amount,
            }],
            confirmed: true,
        })
        .await;

    // The payer accepted the held invoice.
    nursery
        .handle_lightning_event(LightningEvent::InvoiceAccepted { preimage_hash })
        .await;

    // The user claims, revealing the preimage in the witness.
    nursery
        .handle_chain_event(ChainEvent::LockupSpent {
            symbol: "BTC".to_string(),
            transaction_id: txid(0x31),
            spent_address: created.lockup_address.clone(),
            witness: vec![vec![0xaa; 64], preimage.to_vec()],
        })
        .await;

    let swap = ctx
        .repository
        .get_reverse(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionClaimed);
    assert_eq!(swap.preimage, Some(preimage));

    assert_eq!(ctx.lnd.settled.lock().unwrap().as_slice(), &[preimage]);

    assert_eq!(
        drain(&mut events),
        vec![
            SwapStatus::TransactionMempool,
            SwapStatus::TransactionConfirmed,
            SwapStatus::InvoicePending,
            SwapStatus::InvoiceSettled,
            SwapStatus::TransactionClaimed,
        ]
    );
}

#[tokio::test]
async fn reverse_swaps_can_be_disabled() {
    let ctx = setup(Setup {
        allow_reverse_swaps: false,
        ..Setup::default()
    });

    let result = ctx
        .service
        .create_reverse_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(100_000),
            &sha256::Hash::hash(&[0x22; 32]).to_string(),
            keypair(0x02).public_key(),
        )
        .await;

    assert!(matches!(result, Err(Error::ReverseSwapsDisabled)));

    // And re-enabled at runtime.
    ctx.service.set_allow_reverse_swaps(true);
    assert!(ctx
        .service
        .create_reverse_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(100_000),
            &sha256::Hash::hash(&[0x22; 32]).to_string(),
            keypair(0x02).public_key(),
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn reverse_swap_rejects_dust_payouts() {
    let ctx = setup(Setup {
        base_fee: 500,
        percentage_fee: 600,
        ..Setup::default()
    });

    let result = ctx
        .service
        .create_reverse_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(1_000),
            &sha256::Hash::hash(&[0x23; 32]).to_string(),
            keypair(0x02).public_key(),
        )
        .await;

    assert!(matches!(result, Err(Error::OnchainAmountTooLow)));
}

#[tokio::test]
async fn reverse_swap_expiry_cancels_invoice_and_refunds() {
    let ctx = setup(Setup::default());

    let preimage_hash = sha256::Hash::hash(&[0x24; 32]);

    let created = ctx
        .service
        .create_reverse_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(100_000),
            &preimage_hash.to_string(),
            keypair(0x02).public_key(),
        )
        .await
        .unwrap();

    ctx.service
        .nursery()
        .handle_chain_event(ChainEvent::Block {
            symbol: "BTC".to_string(),
            height: created.timeout_block_height,
        })
        .await;

    let swap = ctx
        .repository
        .get_reverse(&created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionRefunded);

    assert_eq!(
        ctx.lnd.cancelled.lock().unwrap().as_slice(),
        &[preimage_hash]
    );
    assert_eq!(ctx.wallet.refunds.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn chain_swap_flow() {
    let ctx = setup(Setup {
        base_fee: 250,
        percentage_fee: 500,
        ..Setup::default()
    });
    let mut events = ctx.service.subscribe();

    let preimage = [0x41; 32];
    let preimage_hash = sha256::Hash::hash(&preimage);

    let created = ctx
        .service
        .create_chain_swap(
            "BTC/LTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(50_000),
            &preimage_hash.to_string(),
            keypair(0x03).public_key(),
            keypair(0x04).public_key(),
        )
        .await
        .unwrap();

    // The user locks on the quote chain, the service sends the base chain.
    assert_eq!(created.receiving.symbol, "LTC");
    assert_eq!(created.sending.symbol, "BTC");
    assert_eq!(
        created.receiving.expected_amount,
        Amount::from_sat(50_750)
    );
    assert_eq!(created.sending.expected_amount, Amount::from_sat(50_000));
    assert!(created.bip21.starts_with("litecoin:"));

    // The service leg expires well before the user leg in wall-clock time.
    assert_eq!(created.sending.timeout_block_height, 1_072);
    assert_eq!(created.receiving.timeout_block_height, 2_576);

    let nursery = ctx.service.nursery();

    // User lockup confirms; the service funds its own leg in response.
    nursery
        .handle_chain_event(ChainEvent::Transaction {
            symbol: "LTC".to_string(),
            transaction_id: txid(0x42),
            outputs: vec![TransactionOutput {
                address: created.receiving.lockup_address.clone(),
                amount: created.receiving.expected_amount,
            }],
            confirmed: true,
        })
        .await;

    {
        let sends = ctx.wallet.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "BTC");
        assert_eq!(sends[0].1, created.sending.lockup_address);
        assert_eq!(sends[0].2, Amount::from_sat(50_000));
    }

    // The user claims the service lockup, revealing the preimage; the
    // service claims the user lockup with it.
    nursery
        .handle_chain_event(ChainEvent::LockupSpent {
            symbol: "BTC".to_string(),
            transaction_id: txid(0x43),
            spent_address: created.sending.lockup_address.clone(),
            witness: vec![preimage.to_vec(), vec![0xbb; 33]],
        })
        .await;

    let swap = ctx.repository.get_chain(&created.id).await.unwrap().unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionClaimed);
    assert_eq!(swap.preimage, Some(preimage));

    {
        let claims = ctx.wallet.claims.lock().unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].0, "LTC");
    }

    assert_eq!(
        drain(&mut events),
        vec![
            SwapStatus::TransactionWaiting,
            SwapStatus::TransactionMempool,
            SwapStatus::TransactionConfirmed,
            SwapStatus::TransactionClaimed,
        ]
    );
}

#[tokio::test]
async fn chain_swap_requires_liquidity() {
    let ctx = setup(Setup {
        balance: Amount::from_sat(1_000),
        ..Setup::default()
    });

    let result = ctx
        .service
        .create_chain_swap(
            "BTC/LTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(50_000),
            &sha256::Hash::hash(&[0x44; 32]).to_string(),
            keypair(0x03).public_key(),
            keypair(0x04).public_key(),
        )
        .await;

    assert!(matches!(result, Err(Error::NotEnoughFunds)));
}

#[tokio::test]
async fn chain_swap_preimage_hash_must_be_unique() {
    let ctx = setup(Setup::default());

    let preimage_hash = sha256::Hash::hash(&[0x45; 32]);

    ctx.service
        .create_chain_swap(
            "BTC/LTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(50_000),
            &preimage_hash.to_string(),
            keypair(0x03).public_key(),
            keypair(0x04).public_key(),
        )
        .await
        .unwrap();

    let result = ctx
        .service
        .create_reverse_swap(
            "BTC/BTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(100_000),
            &preimage_hash.to_string(),
            keypair(0x02).public_key(),
        )
        .await;

    assert!(matches!(result, Err(Error::SwapWithPreimageExists)));
}

#[tokio::test]
async fn chain_swap_expiry_refunds_the_funded_leg() {
    let ctx = setup(Setup::default());

    let created = ctx
        .service
        .create_chain_swap(
            "BTC/LTC",
            "buy",
            SwapVersion::Taproot,
            Amount::from_sat(50_000),
            &sha256::Hash::hash(&[0x46; 32]).to_string(),
            keypair(0x03).public_key(),
            keypair(0x04).public_key(),
        )
        .await
        .unwrap();

    let nursery = ctx.service.nursery();

    // User lockup confirms, service funds its leg, then the user never
    // claims.
    nursery
        .handle_chain_event(ChainEvent::Transaction {
            symbol: "LTC".to_string(),
            transaction_id: txid(0x47),
            outputs: vec![TransactionOutput {
                address: created.receiving.lockup_address.clone(),
                amount: created.receiving.expected_amount,
            }],
            confirmed: true,
        })
        .await;

    nursery
        .handle_chain_event(ChainEvent::Block {
            symbol: "BTC".to_string(),
            height: created.sending.timeout_block_height,
        })
        .await;

    let swap = ctx.repository.get_chain(&created.id).await.unwrap().unwrap();
    assert_eq!(swap.status, SwapStatus::TransactionRefunded);

    let refunds = ctx.wallet.refunds.lock().unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].0, "BTC");
}
