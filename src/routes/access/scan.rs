use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppError,
    routes::{
        gamification::model::{DailyPoints, Notification, NotificationType, level_up_message},
        member::model::Member,
        membership::model::Membership,
    },
    scoring::{self, VisitScore},
};

use super::model::{
    AccessGranted, AccessLog, AccessOutcome, AccessResult, MembershipSummary, PointsAwarded,
    ScannedMember,
};

/// Validates a scanned QR token on behalf of `staff_id`.
///
/// Runs as one transaction: the member row is locked for the duration, so
/// concurrent scans of the same card are serialized, and the daily points
/// row is protected by its `(member_id, date)` uniqueness as well. The
/// access log, the points award, the member update and any level-up
/// notification commit together or not at all.
pub async fn validate_qr(
    pool: &PgPool,
    qr_code: &str,
    staff_id: Uuid,
    today: NaiveDate,
) -> Result<AccessOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let Some(member) = Member::find_by_qr_code_for_update(&mut *tx, qr_code.trim()).await? else {
        AccessLog::record(&mut *tx, None, staff_id, AccessResult::Denied).await?;
        tx.commit().await?;
        tracing::info!("Denied scan of unknown QR token by staff {}", staff_id);
        return Ok(AccessOutcome::denied("Member not found", None));
    };

    let Some(membership) = Membership::authoritative_active(&mut *tx, member.member_id).await?
    else {
        AccessLog::record(&mut *tx, Some(member.member_id), staff_id, AccessResult::Denied).await?;
        tx.commit().await?;
        tracing::info!("Denied member {}: no active membership", member.member_id);
        return Ok(AccessOutcome::denied(
            "No active membership",
            Some(member.contact()),
        ));
    };

    AccessLog::record(&mut *tx, Some(member.member_id), staff_id, AccessResult::Granted).await?;

    let progress = member.progress();
    let already_awarded = DailyPoints::exists_for(&mut *tx, member.member_id, today).await?;
    let score = if already_awarded {
        None
    } else {
        let score = scoring::score_visit(&progress, today);
        let inserted = DailyPoints::insert_if_absent(
            &mut *tx,
            member.member_id,
            today,
            score.base_points,
            score.multiplier,
            score.earned,
        )
        .await?;
        // 插入冲突说明今天已经记过分
        inserted.map(|_| score)
    };

    let points = match score {
        Some(score) => {
            award_visit(&mut tx, member.member_id, &score).await?;
            PointsAwarded {
                earned: score.earned,
                streak: score.streak,
                multiplier: score.multiplier,
                total: score.total_points,
                new_level: score.leveled_up.then_some(score.level),
            }
        }
        None => PointsAwarded {
            earned: 0,
            streak: progress.current_streak,
            multiplier: 1.0,
            total: progress.total_points,
            new_level: None,
        },
    };

    tx.commit().await?;

    tracing::info!(
        "Granted member {} (earned {}, streak {})",
        member.member_id,
        points.earned,
        points.streak
    );

    Ok(AccessOutcome::Granted(AccessGranted {
        access: true,
        message: "Access Granted".into(),
        member: ScannedMember {
            member_id: member.member_id,
            first_name: member.first_name,
            last_name: member.last_name,
            email: member.email,
            phone_number: member.phone_number,
        },
        membership: MembershipSummary {
            membership_id: membership.membership_id,
            membership_type: membership.membership_type,
            purchase_date: membership.purchase_date,
            expiration_date: membership.expiration_date,
        },
        points,
    }))
}

async fn award_visit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    member_id: Uuid,
    score: &VisitScore,
) -> Result<(), sqlx::Error> {
    Member::apply_visit_score(&mut **tx, member_id, score, Utc::now()).await?;

    if score.leveled_up {
        let (title, message) = level_up_message(score.level);
        Notification::create(
            &mut **tx,
            member_id,
            &title,
            &message,
            NotificationType::Achievement,
        )
        .await?;
        tracing::info!("Member {} reached level {}", member_id, score.level);
    }
    Ok(())
}
