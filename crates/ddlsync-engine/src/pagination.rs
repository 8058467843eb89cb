//! Continuation-token pagination over catalog listings

use std::future::Future;

use ddlsync_catalog::{CatalogError, Page};
use futures::stream::{self, Stream, TryStreamExt};

/// Lazily fetch pages until the service stops returning a continuation token
///
/// `fetch` receives `None` for the first page and the previous page's token
/// afterwards. Each stream item is one page's items.
pub fn paginate<T, F, Fut>(fetch: F) -> impl Stream<Item = Result<Vec<T>, CatalogError>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, CatalogError>>,
{
    // `None` once the last page has been produced
    let cursor: Option<Option<String>> = Some(None);

    stream::try_unfold((fetch, cursor), |(mut fetch, cursor)| async move {
        let Some(token) = cursor else {
            return Ok::<_, CatalogError>(None);
        };

        let page = fetch(token).await?;
        let next = page.next_token.map(Some);
        Ok(Some((page.items, (fetch, next))))
    })
}

/// Fetch every page and concatenate the items in discovery order
pub async fn collect_pages<T, F, Fut>(fetch: F) -> Result<Vec<T>, CatalogError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, CatalogError>>,
{
    paginate(fetch).try_concat().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn numbers(token: Option<String>) -> Result<Page<u32>, CatalogError> {
        let start: u32 = token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (start + 3).min(10);
        Ok(Page {
            items: (start..end).collect(),
            next_token: (end < 10).then(|| end.to_string()),
        })
    }

    #[tokio::test]
    async fn collects_all_pages_in_order() {
        let items = collect_pages(|token| async move { numbers(token) })
            .await
            .unwrap();
        assert_eq!(items, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stream_yields_one_item_per_page() {
        let pages: Vec<_> = paginate(|token| async move { numbers(token) })
            .collect()
            .await;
        assert_eq!(pages.len(), 4);
    }

    #[tokio::test]
    async fn passes_tokens_through() {
        let seen = Mutex::new(Vec::new());
        collect_pages(|token| {
            seen.lock().unwrap().push(token.clone());
            async move { numbers(token) }
        })
        .await
        .unwrap();

        assert_eq!(
            seen.into_inner().unwrap(),
            vec![None, Some("3".to_string()), Some("6".to_string()), Some("9".to_string())]
        );
    }

    #[tokio::test]
    async fn stops_on_error() {
        let result = collect_pages(|token| async move {
            match token {
                None => numbers(None),
                Some(_) => Err(CatalogError::Service("throttled".into())),
            }
        })
        .await;
        assert!(matches!(result, Err(CatalogError::Service(_))));
    }
}
