//! Seed data for running against the in-process ledger.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use wayfare_booking::BookingError;
use wayfare_gateway::{
    ContractClient, CustomerRegistration, GatewayError, GatewayResult, LedgerIdentity, NewTicket,
    ProviderRegistration, Visibility,
};
use wayfare_types::{Principal, Role, TicketId, TransportMode, UserId};

use crate::error::ServerResult;

pub const DEMO_TICKET: &str = "DEMO-1";
const DEMO_PROVIDER: &str = "demo-provider";
const DEMO_SEATS: [&str; 8] = ["1A", "1B", "1C", "1D", "2A", "2B", "2C", "2D"];

/// Register every customer and provider principal and list one ticket.
///
/// Everything is submitted as `admin`. The ticket belongs to the first
/// configured provider, or to a demo provider when none is configured.
pub async fn seed(
    contract: &ContractClient,
    admin: &LedgerIdentity,
    principals: &[Principal],
) -> ServerResult<TicketId> {
    seed_ledger(contract, admin, principals)
        .await
        .map_err(|e| BookingError::from(e).into())
}

async fn seed_ledger(
    contract: &ContractClient,
    admin: &LedgerIdentity,
    principals: &[Principal],
) -> GatewayResult<TicketId> {
    let mut principals = principals.to_vec();
    principals.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    principals.dedup_by(|a, b| a.user_id == b.user_id);

    let mut provider = None;
    for principal in &principals {
        match principal.role {
            Role::Customer => {
                let registration = CustomerRegistration {
                    id: principal.user_id.clone(),
                    name: principal.user_id.to_string(),
                    email: format!("{}@example.test", principal.user_id),
                    phone: String::new(),
                    visibility: Visibility::Public,
                };
                contract.register_customer(admin, &registration).await?;
            }
            Role::Provider => {
                contract
                    .register_provider(admin, &provider_registration(principal.user_id.clone()))
                    .await?;
                provider.get_or_insert_with(|| principal.user_id.clone());
            }
            Role::Admin => {}
        }
    }

    let provider = match provider {
        Some(id) => id,
        None => {
            let id = UserId::new(DEMO_PROVIDER)
                .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;
            contract
                .register_provider(admin, &provider_registration(id.clone()))
                .await?;
            id
        }
    };

    let id = TicketId::new(DEMO_TICKET)
        .map_err(|e| GatewayError::InvalidArgument(e.to_string()))?;
    let departure = Utc::now() + Duration::days(14);
    contract
        .create_ticket(
            admin,
            &NewTicket {
                id: id.clone(),
                origin: "Lisbon".into(),
                destination: "Porto".into(),
                departure_time: departure,
                arrival_time: departure + Duration::hours(3),
                price: Decimal::from(50),
                seat_numbers: DEMO_SEATS.iter().map(|s| s.to_string()).collect(),
                provider,
                transport_mode: TransportMode::Land,
            },
        )
        .await?;
    Ok(id)
}

fn provider_registration(id: UserId) -> ProviderRegistration {
    ProviderRegistration {
        name: id.to_string(),
        email: format!("{id}@example.test"),
        phone: String::new(),
        transport_mode: TransportMode::Land,
        id,
    }
}
