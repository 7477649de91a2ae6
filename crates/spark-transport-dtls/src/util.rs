use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use spark_core::contract::{CallContext, Cancellation};
use spark_core::error::CoreError;
use spark_core::time::monotonic_now;
use spark_transport::error::io_error;
use spark_transport::{Multiaddr, Network, Protocol};
use tokio::time::Instant as TokioInstant;

use crate::error::{self, OperationKind, RESOLVE};

/// DTLS 辅助工具集合。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 引擎握手、地址解析与 `accept` 都可能长时间阻塞；把 `CallContext` 的取消与截止语义
///   集中落实在一处，避免每个调用点重复编写 `tokio::select!`。
///
/// ## 逻辑（How）
/// - `run_with_context` 先检查已取消/已超时，再把 Future 与“取消轮询”“截止定时器”竞速；
/// - 上下文未设置截止时间时，`bounded_by_fallback` 以调用方给出的兜底超时（如握手超时）
///   约束操作本身，其超时属于操作失败而非上下文中止；
/// - `resolve_endpoint` 把去掉 `/dtls` 后的端点解析为具体套接字地址。
///
/// ## 风险与权衡（Trade-offs）
/// - 取消以 5ms 间隔轮询，存在毫秒级延迟，但无需为每次调用额外派生任务。
const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(crate) async fn run_with_context<F, T>(
    ctx: &CallContext,
    kind: OperationKind,
    future: F,
) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    if ctx.deadline().is_expired(monotonic_now()) {
        return Err(error::timeout_error(kind));
    }
    if ctx.cancellation().is_cancelled() {
        return Err(error::cancelled_error(kind));
    }

    let cancel = wait_for_cancellation(ctx.cancellation());
    tokio::pin!(cancel);
    tokio::pin!(future);

    let deadline = ctx
        .deadline()
        .instant()
        .map(|instant| TokioInstant::from_std(instant.to_instant()));

    match deadline {
        Some(deadline) => {
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);
            tokio::select! {
                biased;
                _ = &mut cancel => Err(error::cancelled_error(kind)),
                _ = &mut sleep => Err(error::timeout_error(kind)),
                result = &mut future => result,
            }
        }
        None => {
            tokio::select! {
                biased;
                _ = &mut cancel => Err(error::cancelled_error(kind)),
                result = &mut future => result,
            }
        }
    }
}

/// 上下文没有截止时间时，以 `limit` 约束 `future`，超时返回 `kind` 的超时错误。
///
/// 上下文自带截止时间时不做额外约束，由 [`run_with_context`] 负责。
pub(crate) async fn bounded_by_fallback<F, T>(
    ctx: &CallContext,
    kind: OperationKind,
    limit: Option<Duration>,
    future: F,
) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    match limit {
        Some(limit) if ctx.deadline().instant().is_none() => {
            tokio::time::timeout(limit, future)
                .await
                .unwrap_or_else(|_| Err(error::timeout_error(kind)))
        }
        _ => future.await,
    }
}

async fn wait_for_cancellation(cancellation: &Cancellation) {
    while !cancellation.is_cancelled() {
        tokio::time::sleep(CANCELLATION_POLL_INTERVAL).await;
    }
}

/// 把 `/<host>/udp/<port>` 端点解析为网络族与套接字地址。
///
/// - `ip4`/`ip6`：直接构造，不产生 I/O；
/// - `dns4`/`dns6`：仅接受对应地址族的解析结果；
/// - `dns`：按 `prefer_ipv6` 挑选首选地址族，缺失时退回另一族。
pub(crate) async fn resolve_endpoint(
    endpoint: &Multiaddr,
    prefer_ipv6: bool,
) -> Result<(Network, SocketAddr), CoreError> {
    let (host, family, port) = match endpoint.segments() {
        [Protocol::Ip4(ip), Protocol::Udp(port)] => {
            let addr = SocketAddr::new((*ip).into(), *port);
            return Ok((Network::Udp4, addr));
        }
        [Protocol::Ip6(ip), Protocol::Udp(port)] => {
            let addr = SocketAddr::new((*ip).into(), *port);
            return Ok((Network::Udp6, addr));
        }
        [Protocol::Dns(host), Protocol::Udp(port)] => (host, None, *port),
        [Protocol::Dns4(host), Protocol::Udp(port)] => (host, Some(Network::Udp4), *port),
        [Protocol::Dns6(host), Protocol::Udp(port)] => (host, Some(Network::Udp6), *port),
        _ => return Err(error::resolution_error(endpoint, "不是 UDP 端点")),
    };

    let candidates: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|err| {
            io_error(
                RESOLVE.code,
                format!("{} {endpoint}", RESOLVE.message),
                err,
            )
        })?
        .collect();

    let pick = |network: Network| {
        candidates
            .iter()
            .copied()
            .find(|addr| Network::of(addr) == network)
    };
    let chosen = match family {
        Some(network) => pick(network),
        None => {
            let (first, second) = if prefer_ipv6 {
                (Network::Udp6, Network::Udp4)
            } else {
                (Network::Udp4, Network::Udp6)
            };
            pick(first).or_else(|| pick(second))
        }
    };

    chosen
        .map(|addr| (Network::of(&addr), addr))
        .ok_or_else(|| error::resolution_error(endpoint, "没有可用的地址"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_core::error::codes;

    #[tokio::test]
    async fn literal_endpoints_resolve_without_lookup() {
        let endpoint: Multiaddr = "/ip6/::1/udp/4433".parse().expect("addr");
        let (network, addr) = resolve_endpoint(&endpoint, false).await.expect("resolve");
        assert_eq!(network, Network::Udp6);
        assert_eq!(addr, "[::1]:4433".parse::<SocketAddr>().expect("socket"));
    }

    #[tokio::test]
    async fn non_udp_endpoint_is_a_resolution_error() {
        let endpoint: Multiaddr = "/ip4/127.0.0.1/tcp/1".parse().expect("addr");
        let err = resolve_endpoint(&endpoint, false).await.expect_err("tcp");
        assert_eq!(err.code(), codes::TRANSPORT_RESOLUTION);
    }

    #[tokio::test]
    async fn localhost_resolves_within_requested_family() {
        let endpoint: Multiaddr = "/dns4/localhost/udp/9".parse().expect("addr");
        let (network, addr) = resolve_endpoint(&endpoint, true).await.expect("resolve");
        assert_eq!(network, Network::Udp4);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let ctx = CallContext::default();
        ctx.cancellation().cancel();
        let pending = std::future::pending::<Result<(), CoreError>>();
        let err = run_with_context(&ctx, RESOLVE, pending)
            .await
            .expect_err("cancelled");
        assert_eq!(err.code(), codes::TRANSPORT_CANCELLED);
    }

    #[tokio::test]
    async fn fallback_timeout_applies_without_deadline() {
        let ctx = CallContext::default();
        let err = bounded_by_fallback(
            &ctx,
            RESOLVE,
            Some(Duration::from_millis(20)),
            std::future::pending::<Result<(), CoreError>>(),
        )
        .await
        .expect_err("timeout");
        assert_eq!(err.code(), codes::TRANSPORT_TIMEOUT);
    }

    #[tokio::test]
    async fn context_deadline_wins_over_fallback() {
        let ctx = CallContext::builder()
            .with_timeout(Duration::from_millis(20))
            .build();
        let started = std::time::Instant::now();
        let err = run_with_context(
            &ctx,
            RESOLVE,
            bounded_by_fallback(
                &ctx,
                RESOLVE,
                Some(Duration::from_secs(30)),
                std::future::pending::<Result<(), CoreError>>(),
            ),
        )
        .await
        .expect_err("timeout");
        assert_eq!(err.code(), codes::TRANSPORT_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
