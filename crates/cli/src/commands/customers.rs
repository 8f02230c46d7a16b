//! Customer record commands.

use std::error::Error;

use tokio::io::{AsyncBufReadExt, BufReader};

use customer_manager_client::{
    AddressAutocomplete, CustomerClient, CustomerSearch, SearchState, set_geo_fields,
};
use customer_manager_core::{Customer, CustomerDraft, CustomerId, CustomerPatch};

use super::{Context, print_json, say};

fn client(ctx: &Context) -> CustomerClient {
    CustomerClient::new(ctx.session.clone())
}

/// Run a customer call, forgetting the stored token if the server rejected it.
async fn observed<T>(
    ctx: &Context,
    call: impl Future<Output = Result<T, customer_manager_client::ClientError>>,
) -> Result<T, Box<dyn Error>> {
    let result = call.await;
    if ctx.session.current_user().is_none() {
        ctx.save_token()?;
    }
    Ok(result?)
}

fn print_table(customers: &[Customer]) {
    if customers.is_empty() {
        say("No customers");
        return;
    }
    for c in customers {
        say(&format!(
            "{}  {:<24} {:<28} {}",
            c.id,
            c.full_name(),
            c.email.as_str(),
            c.formatted_address.as_deref().unwrap_or(c.address.as_str())
        ));
    }
}

/// List own customers, optionally filtered by a search term.
pub async fn list(ctx: &Context, search: Option<&str>) -> Result<(), Box<dyn Error>> {
    let customers = client(ctx);
    let found = match search {
        Some(term) => observed(ctx, customers.search(term)).await?,
        None => observed(ctx, customers.list()).await?,
    };
    print_table(&found);
    Ok(())
}

pub async fn get(ctx: &Context, id: CustomerId) -> Result<(), Box<dyn Error>> {
    let customer = observed(ctx, client(ctx).get(id)).await?;
    print_json(&customer)?;
    Ok(())
}

/// Create a record; the address is geocoded unless `geocode` is false.
pub async fn create(ctx: &Context, draft: CustomerDraft, geocode: bool) -> Result<(), Box<dyn Error>> {
    let geo = if geocode {
        let mut field = AddressAutocomplete::new(ctx.session.api().clone());
        field.input(draft.address.clone());
        field.resolve_for_submit().await
    } else {
        None
    };
    if geocode && geo.is_none() {
        say("Address could not be geocoded; saving without coordinates");
    }

    let customer = observed(ctx, client(ctx).create(draft, geo)).await?;
    print_json(&customer)?;
    Ok(())
}

/// Change the given fields of a record.
///
/// A changed address is re-geocoded unless `geocode` is false. When that
/// finds nothing the old formatted address and coordinates are cleared.
pub async fn update(
    ctx: &Context,
    id: CustomerId,
    mut patch: CustomerPatch,
    geocode: bool,
) -> Result<(), Box<dyn Error>> {
    if geocode
        && patch.formatted_address.is_none()
        && let Some(address) = &patch.address
    {
        let mut field = AddressAutocomplete::new(ctx.session.api().clone());
        field.input(address.clone());
        let found = field.resolve_for_submit().await;
        set_geo_fields(&mut patch, found);
    }

    let customer = observed(ctx, client(ctx).update(id, &patch)).await?;
    print_json(&customer)?;
    Ok(())
}

pub async fn delete(ctx: &Context, id: CustomerId) -> Result<(), Box<dyn Error>> {
    observed(ctx, client(ctx).delete(id)).await?;
    say(&format!("Deleted {id}"));
    Ok(())
}

/// Search as you type: each stdin line replaces the search term.
pub async fn live_search(ctx: &Context) -> Result<(), Box<dyn Error>> {
    let search = CustomerSearch::new(client(ctx));
    let mut changes = search.subscribe();

    say("Type to search, Ctrl-D to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => search.input(line),
                None => break,
            },
            Ok(()) = changes.changed() => {
                let state = changes.borrow_and_update().clone();
                print_resolved(&state);
            }
        }
    }

    // Input closed; the last term still gets its answer.
    search.settled().await;
    if changes.has_changed().unwrap_or(false) {
        let state = changes.borrow_and_update().clone();
        print_resolved(&state);
    }
    search.clear();
    Ok(())
}

fn print_resolved(state: &SearchState<Vec<Customer>>) {
    if let SearchState::Resolved { query, results } = state {
        say(&format!("-- {} match(es) for {query:?}", results.len()));
        print_table(results);
    }
}
