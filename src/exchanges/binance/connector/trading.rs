use crate::core::{
    errors::ExchangeError,
    kernel::{Params, RestClient},
    traits::{OrderPlacer, PairFormatter},
    types::{AssetClass, OrderRequest, OrderResponse, OrderType, Pair},
};
use crate::exchanges::binance::{conversions, rest::BinanceRestClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// Order entry for Binance
pub struct Trading<R: RestClient> {
    rest: Arc<BinanceRestClient<R>>,
    pairs: Arc<dyn PairFormatter>,
}

impl<R: RestClient> Trading<R> {
    pub fn new(rest: Arc<BinanceRestClient<R>>, pairs: Arc<dyn PairFormatter>) -> Self {
        Self { rest, pairs }
    }
}

/// Order parameters in the venue's vocabulary.
pub fn order_params(
    asset: AssetClass,
    order: &OrderRequest,
    pairs: &dyn PairFormatter,
) -> Result<Params, ExchangeError> {
    let order_type = if asset.is_derivative() {
        conversions::order_type(order.order_type)
    } else {
        conversions::spot_order_type(order.order_type)
    };

    let mut params = vec![
        ("symbol".to_string(), pairs.format(&order.pair, asset)),
        ("side".to_string(), order.side.as_str().to_string()),
        ("type".to_string(), order_type.to_string()),
        ("quantity".to_string(), order.quantity.to_string()),
    ];

    let needs_price = matches!(
        order.order_type,
        OrderType::Limit | OrderType::StopLimit | OrderType::TakeProfitLimit
    );
    if needs_price {
        let price = order.price.ok_or_else(|| {
            ExchangeError::InvalidParameters(format!("{:?} order requires a price", order.order_type))
        })?;
        params.push(("price".to_string(), price.to_string()));
        let tif = order.time_in_force.unwrap_or(crate::core::types::TimeInForce::GTC);
        params.push(("timeInForce".to_string(), tif.as_str().to_string()));
    }

    if !matches!(order.order_type, OrderType::Market | OrderType::Limit) {
        let stop = order.stop_price.ok_or_else(|| {
            ExchangeError::InvalidParameters(format!(
                "{:?} order requires a stop price",
                order.order_type
            ))
        })?;
        params.push(("stopPrice".to_string(), stop.to_string()));
    }

    if asset.is_derivative() {
        if order.reduce_only {
            params.push(("reduceOnly".to_string(), "true".to_string()));
        }
        if let Some(side) = order.position_side {
            let side = match side {
                crate::core::types::PositionSide::Long => "LONG",
                crate::core::types::PositionSide::Short => "SHORT",
                crate::core::types::PositionSide::Both => "BOTH",
            };
            params.push(("positionSide".to_string(), side.to_string()));
        }
    }

    if let Some(client_id) = &order.client_order_id {
        params.push(("newClientOrderId".to_string(), client_id.clone()));
    }

    Ok(params)
}

#[async_trait]
impl<R: RestClient> OrderPlacer for Trading<R> {
    #[instrument(skip(self, order), fields(exchange = "binance", asset = %asset, pair = %order.pair))]
    async fn place_order(
        &self,
        asset: AssetClass,
        order: OrderRequest,
    ) -> Result<OrderResponse, ExchangeError> {
        let params = order_params(asset, &order, self.pairs.as_ref())?;
        let response = self.rest.place_order(asset, params).await?;
        conversions::order_response(asset, self.pairs.as_ref(), response)
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset, pair = %pair))]
    async fn cancel_order(
        &self,
        asset: AssetClass,
        pair: &Pair,
        order_id: &str,
    ) -> Result<OrderResponse, ExchangeError> {
        let symbol = self.pairs.format(pair, asset);
        let response = self.rest.cancel_order(asset, &symbol, order_id).await?;
        conversions::order_response(asset, self.pairs.as_ref(), response)
    }

    #[instrument(skip(self), fields(exchange = "binance", asset = %asset))]
    async fn get_open_orders(
        &self,
        asset: AssetClass,
        pair: Option<&Pair>,
    ) -> Result<Vec<OrderResponse>, ExchangeError> {
        let symbol = pair.map(|p| self.pairs.format(p, asset));
        let orders = self.rest.get_open_orders(asset, symbol.as_deref()).await?;
        orders
            .into_iter()
            .map(|o| conversions::order_response(asset, self.pairs.as_ref(), o))
            .collect()
    }
}
