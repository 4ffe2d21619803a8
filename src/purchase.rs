//! Purchase reconciliation: verify a payment provider's signed callback, then
//! record the purchase and the enrollment it entitles.

use crate::access::require_role;
use crate::db::{self, NewPurchase, Pool, PurchaseInsert};
use crate::error::{storage, CoreError, CoreResult};
use crate::model::{Purchase, Role};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use tracing::{info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Keyed-hash check of `order_id|payment_id` against the provider signature.
#[derive(Clone)]
pub struct SignatureVerifier {
    key: Vec<u8>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, order_id: &str, payment_id: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Some(mac)
    }

    /// Lowercase hex signature the provider is expected to send.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> Option<String> {
        self.mac(order_id, payment_id)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison of the supplied hex signature.
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(supplied) = hex::decode(signature.trim()) else {
            return false;
        };
        self.mac(order_id, payment_id)
            .is_some_and(|mac| mac.verify_slice(&supplied).is_ok())
    }
}

/// Payment provider callback. Every field is optional on the wire so that a
/// missing one surfaces as `InvalidRequest` rather than a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentVerification {
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub course_id: Option<String>,
    pub user_id: Option<String>,
    pub amount: Option<i64>,
}

struct VerifiedFields {
    order_id: String,
    payment_id: String,
    signature: String,
    course_id: String,
    user_id: String,
    amount: i64,
}

fn required(field: &str, value: &Option<String>) -> CoreResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoreError::InvalidRequest(format!("{} is required", field)))
}

impl PaymentVerification {
    fn validate(&self) -> CoreResult<VerifiedFields> {
        let amount = self
            .amount
            .ok_or_else(|| CoreError::InvalidRequest("amount is required".into()))?;
        if amount < 0 {
            return Err(CoreError::InvalidRequest("amount must not be negative".into()));
        }
        Ok(VerifiedFields {
            order_id: required("order_id", &self.order_id)?,
            payment_id: required("payment_id", &self.payment_id)?,
            signature: required("signature", &self.signature)?,
            course_id: required("course_id", &self.course_id)?,
            user_id: required("user_id", &self.user_id)?,
            amount,
        })
    }
}

/// Verify the callback and record it. Nothing is written unless the signature
/// checks out and the amount covers the course price; a replayed
/// (order_id, payment_id) yields `Conflict`.
#[instrument(skip_all)]
pub async fn verify_payment(
    pool: &Pool,
    verifier: &SignatureVerifier,
    req: &PaymentVerification,
) -> CoreResult<Purchase> {
    let fields = req.validate()?;
    if !verifier.verify(&fields.order_id, &fields.payment_id, &fields.signature) {
        warn!(
            order_id = %fields.order_id,
            user_id = %fields.user_id,
            course_id = %fields.course_id,
            "payment signature rejected"
        );
        return Err(CoreError::SignatureInvalid);
    }

    let user_id = fields.user_id.as_str();
    let course_id = fields.course_id.as_str();
    let course = db::get_course_by_id(pool, course_id)
        .await
        .map_err(storage("verify_payment", user_id, course_id))?
        .ok_or_else(|| CoreError::CourseNotFound(fields.course_id.clone()))?;
    if fields.amount < course.price {
        warn!(
            order_id = %fields.order_id,
            user_id,
            course_id,
            amount = fields.amount,
            price = course.price,
            "payment below course price"
        );
        return Err(CoreError::InvalidRequest(format!(
            "amount {} is below the course price {}",
            fields.amount, course.price
        )));
    }

    let new = NewPurchase {
        user_id: fields.user_id.clone(),
        course_id: fields.course_id.clone(),
        amount: fields.amount,
        order_id: fields.order_id.clone(),
        payment_id: fields.payment_id.clone(),
    };
    match db::record_completed_purchase(pool, &new)
        .await
        .map_err(storage("verify_payment", user_id, course_id))?
    {
        PurchaseInsert::Recorded(purchase) => Ok(purchase),
        PurchaseInsert::Duplicate => {
            info!(order_id = %new.order_id, payment_id = %new.payment_id, "payment replay ignored");
            Err(CoreError::Conflict {
                order_id: new.order_id,
                payment_id: new.payment_id,
            })
        }
    }
}

/// Purchases made by the caller, oldest first.
pub async fn list_for_caller(pool: &Pool, caller: Option<&str>) -> CoreResult<Vec<Purchase>> {
    let user_id = caller
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(CoreError::Unauthenticated)?;
    db::list_purchases_for_user(pool, user_id)
        .await
        .map_err(storage("list_purchases", user_id, ""))
}

/// Administrative enrollment. Recorded as a zero-amount completed purchase so
/// every enrollment stays backed by a purchase.
#[instrument(skip_all)]
pub async fn grant_enrollment(
    pool: &Pool,
    caller: Option<&str>,
    user_id: &str,
    course_id: &str,
) -> CoreResult<Purchase> {
    let admin = require_role(pool, caller, &[Role::Admin]).await?;
    let user_id = required("user_id", &Some(user_id.to_string()))?;
    let course_id = required("course_id", &Some(course_id.to_string()))?;
    let exists = db::get_course_by_id(pool, &course_id)
        .await
        .map_err(storage("grant_enrollment", &user_id, &course_id))?
        .is_some();
    if !exists {
        return Err(CoreError::CourseNotFound(course_id));
    }

    let new = NewPurchase {
        user_id: user_id.clone(),
        course_id: course_id.clone(),
        amount: 0,
        order_id: format!("grant:{}", uuid::Uuid::new_v4()),
        payment_id: format!("admin:{}", admin.id),
    };
    match db::record_completed_purchase(pool, &new)
        .await
        .map_err(storage("grant_enrollment", &user_id, &course_id))?
    {
        PurchaseInsert::Recorded(purchase) => {
            info!(admin = %admin.id, user_id = %user_id, course_id = %course_id, "enrollment granted");
            Ok(purchase)
        }
        PurchaseInsert::Duplicate => Err(CoreError::Conflict {
            order_id: new.order_id,
            payment_id: new.payment_id,
        }),
    }
}
